//! Transient vs permanent fleet API failures.
//!
//! Only a server-side status (500–599) is worth retrying. Client errors,
//! transport failures and undecodable bodies are permanent.

use fleet_api::FleetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        self == ErrorClass::Transient
    }
}

pub fn classify(err: &FleetError) -> ErrorClass {
    match err.status() {
        Some(status) if (500..600).contains(&status) => ErrorClass::Transient,
        _ => ErrorClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn server_errors_are_transient() {
        for status in [500, 502, 503, 599] {
            assert_eq!(
                classify(&FleetError::api(status, "boom")),
                ErrorClass::Transient,
                "status {status}"
            );
        }
    }

    #[test]
    fn everything_else_is_permanent() {
        for status in [400, 401, 404, 422, 499, 600] {
            assert_eq!(
                classify(&FleetError::api(status, "nope")),
                ErrorClass::Permanent,
                "status {status}"
            );
        }
        let not_ready = FleetError::AppNotReady {
            app: "b".into(),
            waited: Duration::from_secs(30),
        };
        assert!(!classify(&not_ready).is_transient());
        let decode = FleetError::Decode {
            context: "machine list".into(),
            source: serde_json::from_str::<u8>("[]").unwrap_err(),
        };
        assert!(!classify(&decode).is_transient());
    }
}
