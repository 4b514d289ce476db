pub mod forces;
pub mod parallel;
pub mod sequential;
