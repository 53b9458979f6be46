use serde::{Deserialize, Serialize};

/// 学生答卷记录（查询接口返回的一行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    /// 不透明的学生主键
    #[serde(deserialize_with = "deserialize_id")]
    pub student_uid: String,
    /// 展示用学号
    #[serde(deserialize_with = "deserialize_id")]
    pub student_id: String,
    /// 原始作答文本
    #[serde(default)]
    pub student_answer: String,
}

impl StudentRecord {
    pub fn new(
        student_uid: impl Into<String>,
        student_id: impl Into<String>,
        student_answer: impl Into<String>,
    ) -> Self {
        Self {
            student_uid: student_uid.into(),
            student_id: student_id.into(),
            student_answer: student_answer.into(),
        }
    }
}

/// 登录后的评分员身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaterIdentity {
    pub rater_uid: String,
    pub rater_id: String,
}

// 学号在数据库里可能是整数列，接口会原样返回数字
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer identifier")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.trim().to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
