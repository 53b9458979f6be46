use serde::{Deserialize, Serialize};

/// 评分维度
///
/// 声明顺序即规范顺序（Scientific < Critical），高亮候选合并与展示都依赖这个顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// 数理科学思维
    Scientific,
    /// 批判性思维
    Critical,
}

/// 维度别名表（服务端字段名、模型输出字段名、界面标签）
static ALIASES: phf::Map<&'static str, Dimension> = phf::phf_map! {
    "scientific" => Dimension::Scientific,
    "scientificknowledge" => Dimension::Scientific,
    "sci" => Dimension::Scientific,
    "knw" => Dimension::Scientific,
    "math" => Dimension::Scientific,
    "数理科学思维" => Dimension::Scientific,
    "수과학적 사고" => Dimension::Scientific,
    "critical" => Dimension::Critical,
    "criticalthinking" => Dimension::Critical,
    "crt" => Dimension::Critical,
    "批判性思维" => Dimension::Critical,
    "비판적 사고" => Dimension::Critical,
};

impl Dimension {
    /// 全部维度（规范顺序）
    pub const ALL: [Dimension; 2] = [Dimension::Scientific, Dimension::Critical];

    /// 评分模型输出中使用的键
    pub fn rubric_key(self) -> &'static str {
        match self {
            Dimension::Scientific => "scientificKnowledge",
            Dimension::Critical => "criticalThinking",
        }
    }

    /// 标准名称
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Scientific => "数理科学思维",
            Dimension::Critical => "批判性思维",
        }
    }

    /// 终端高亮标记
    pub fn marker(self) -> char {
        match self {
            Dimension::Scientific => 'S',
            Dimension::Critical => 'C',
        }
    }

    /// 按别名精确查找（忽略大小写和下划线）
    pub fn lookup(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        ALIASES.get(key.as_str()).copied()
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 按维度存放的一组值
///
/// 序列化为 `{"scientific": .., "critical": ..}`，与评分接口的 JSON 结构一致。
/// 反序列化时缺少的维度取 `T::default()`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerDimension<T> {
    #[serde(default)]
    pub scientific: T,
    #[serde(default)]
    pub critical: T,
}

impl<T> PerDimension<T> {
    pub fn new(scientific: T, critical: T) -> Self {
        Self {
            scientific,
            critical,
        }
    }

    pub fn get(&self, dimension: Dimension) -> &T {
        match dimension {
            Dimension::Scientific => &self.scientific,
            Dimension::Critical => &self.critical,
        }
    }

    pub fn get_mut(&mut self, dimension: Dimension) -> &mut T {
        match dimension {
            Dimension::Scientific => &mut self.scientific,
            Dimension::Critical => &mut self.critical,
        }
    }

    /// 按规范顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &T)> {
        Dimension::ALL.into_iter().map(move |d| (d, self.get(d)))
    }

    pub fn map<U>(&self, mut f: impl FnMut(Dimension, &T) -> U) -> PerDimension<U> {
        PerDimension {
            scientific: f(Dimension::Scientific, &self.scientific),
            critical: f(Dimension::Critical, &self.critical),
        }
    }
}
