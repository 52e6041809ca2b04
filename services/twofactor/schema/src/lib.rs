//! sea-orm entities for the tables owned by the two-factor service.
//! The users table lives in the users service and is reached over gRPC.

pub mod backup_codes;
pub mod otp_attempts;
pub mod otp_codes;
