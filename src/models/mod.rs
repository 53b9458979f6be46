pub mod dimension;
pub mod grading;
pub mod lookup;
pub mod student;

pub use dimension::{Dimension, PerDimension};
pub use grading::{
    AiGrade, AiGradeRequest, AiGradeResponse, AiResult, ExpertInput, FinalScoreRequest,
    score_from_value, LoginRequest, LoginResponse, StatusResponse, SCORE_RANGE,
};
pub use lookup::LookupQuery;
pub use student::{RaterIdentity, StudentRecord};
