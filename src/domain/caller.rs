use crate::error::{PoolError, Result};

/// Marker that a request was authenticated as an administrator.
///
/// Issued at the request boundary (HTTP auth, CLI) by convention. Nothing
/// in the type stops other code from issuing one; core operations take it
/// by reference instead of re-checking credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminGrant {
    _private: (),
}

impl AdminGrant {
    pub fn issue() -> Self {
        Self { _private: () }
    }
}

/// Who is invoking an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Public,
    Admin(AdminGrant),
}

impl Caller {
    pub fn admin() -> Self {
        Caller::Admin(AdminGrant::issue())
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::Admin(_))
    }

    pub fn require_admin(&self) -> Result<AdminGrant> {
        match self {
            Caller::Admin(grant) => Ok(*grant),
            Caller::Public => Err(PoolError::AdminRequired),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_caller_cannot_act_as_admin() {
        assert!(!Caller::Public.is_admin());
        assert!(matches!(
            Caller::Public.require_admin(),
            Err(PoolError::AdminRequired)
        ));
        assert_eq!(Caller::admin().require_admin().unwrap(), AdminGrant::issue());
    }
}
