//! Error types for the assignment engine

use thiserror::Error;

/// Caller-visible engine errors.
///
/// These are deterministic rejections: retrying without new information
/// cannot change the outcome, so the engine never retries them internally.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No active session for scope {0}")]
    SessionNotFound(String),

    #[error("Member {0} is already registered")]
    DuplicateRegistration(String),

    #[error("No team has an open keeper slot")]
    RoleUnavailable,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::SessionNotFound("chat-1".to_string());
        assert_eq!(format!("{}", err), "No active session for scope chat-1");

        let err = EngineError::DuplicateRegistration("u42".to_string());
        assert_eq!(format!("{}", err), "Member u42 is already registered");

        let err = EngineError::RoleUnavailable;
        assert_eq!(format!("{}", err), "No team has an open keeper slot");

        let err = EngineError::Unauthorized("organizer rights required".to_string());
        assert_eq!(format!("{}", err), "Not authorized: organizer rights required");

        let err = EngineError::InvalidConfig("team_count must be 2-4".to_string());
        assert_eq!(
            format!("{}", err),
            "Invalid configuration: team_count must be 2-4"
        );
    }

    #[test]
    fn test_engine_error_debug() {
        let err = EngineError::RoleUnavailable;
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("RoleUnavailable"));
    }

    #[test]
    fn test_result_type_alias() {
        fn placed() -> Result<u64> {
            Ok(7)
        }
        assert_eq!(placed().unwrap(), 7);

        fn rejected() -> Result<u64> {
            Err(EngineError::SessionNotFound("gone".to_string()))
        }
        assert!(rejected().is_err());
    }
}
