//! The closed result taxonomy for accessibility calls.
//!
//! Every fallible gateway operation reports exactly one of these kinds. The
//! benign subset degrades to `None`/no-op at the gateway boundary; the severe
//! subset surfaces to the navigator, which converts it to spoken status
//! tokens. A raw OS code outside the taxonomy is a programming error.

use thiserror::Error;

/// Accessibility error taxonomy, mirroring the OS result codes one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum AxError {
    #[error("system failure")]
    SystemFailure,
    #[error("illegal argument")]
    IllegalArgument,
    #[error("invalid element")]
    InvalidElement,
    #[error("invalid observer")]
    InvalidObserver,
    #[error("request timed out")]
    Timeout,
    #[error("attribute unsupported")]
    AttributeUnsupported,
    #[error("action unsupported")]
    ActionUnsupported,
    #[error("notification unsupported")]
    NotificationUnsupported,
    #[error("parameterized attribute unsupported")]
    ParameterizedAttributeUnsupported,
    #[error("not implemented")]
    NotImplemented,
    #[error("notification already registered")]
    NotificationAlreadyRegistered,
    #[error("notification not registered")]
    NotificationNotRegistered,
    #[error("accessibility API disabled")]
    ApiDisabled,
    #[error("no value")]
    NoValue,
    #[error("not enough precision")]
    NotEnoughPrecision,
}

pub type AxResult<T> = Result<T, AxError>;

impl AxError {
    /// Whether this kind degrades locally to `None`/no-op instead of
    /// propagating. The complement (`InvalidElement`, `ApiDisabled`,
    /// `Timeout`, `NotImplemented`, `InvalidObserver`, `NotEnoughPrecision`)
    /// surfaces to the caller.
    pub fn degrades_to_null(self) -> bool {
        matches!(
            self,
            AxError::NoValue
                | AxError::AttributeUnsupported
                | AxError::ParameterizedAttributeUnsupported
                | AxError::ActionUnsupported
                | AxError::NotificationUnsupported
                | AxError::NotificationNotRegistered
                | AxError::NotificationAlreadyRegistered
                | AxError::IllegalArgument
                | AxError::SystemFailure
        )
    }

    /// Map a raw OS accessibility result code. `0` is success (`Ok(())`).
    ///
    /// The numeric values are the AXError constants of the macOS
    /// accessibility client API. Aborts on a code outside the taxonomy: the
    /// user must never see a raw OS code, and an unknown one means the
    /// binding layer is out of date.
    pub fn check(code: i32) -> AxResult<()> {
        match code {
            0 => Ok(()),
            -25200 => Err(AxError::SystemFailure),
            -25201 => Err(AxError::IllegalArgument),
            -25202 => Err(AxError::InvalidElement),
            -25203 => Err(AxError::InvalidObserver),
            -25204 => Err(AxError::Timeout),
            -25205 => Err(AxError::AttributeUnsupported),
            -25206 => Err(AxError::ActionUnsupported),
            -25207 => Err(AxError::NotificationUnsupported),
            -25208 => Err(AxError::NotImplemented),
            -25209 => Err(AxError::NotificationAlreadyRegistered),
            -25210 => Err(AxError::NotificationNotRegistered),
            -25211 => Err(AxError::ApiDisabled),
            -25212 => Err(AxError::NoValue),
            -25213 => Err(AxError::ParameterizedAttributeUnsupported),
            -25214 => Err(AxError::NotEnoughPrecision),
            other => panic!("accessibility API returned unknown result code {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_kinds_degrade() {
        assert!(AxError::NoValue.degrades_to_null());
        assert!(AxError::AttributeUnsupported.degrades_to_null());
        assert!(AxError::SystemFailure.degrades_to_null());
        assert!(!AxError::InvalidElement.degrades_to_null());
        assert!(!AxError::Timeout.degrades_to_null());
        assert!(!AxError::ApiDisabled.degrades_to_null());
        assert!(!AxError::NotImplemented.degrades_to_null());
    }

    #[test]
    fn raw_codes_map_onto_taxonomy() {
        assert_eq!(AxError::check(0), Ok(()));
        assert_eq!(AxError::check(-25202), Err(AxError::InvalidElement));
        assert_eq!(AxError::check(-25204), Err(AxError::Timeout));
        assert_eq!(AxError::check(-25212), Err(AxError::NoValue));
    }

    #[test]
    #[should_panic(expected = "unknown result code")]
    fn unknown_code_aborts() {
        let _ = AxError::check(-1);
    }
}
