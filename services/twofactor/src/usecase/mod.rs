pub mod backup;
pub mod otp;
pub mod rate_limit;
pub mod twofactor;
