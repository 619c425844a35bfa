use core::str::FromStr;

use serde::{Deserialize, Serialize};

use registrar_core::DomainError;

/// Role of a user account.
///
/// The set is closed: policy code matches on it exhaustively, so adding a
/// role forces every decision function to be revisited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Student,
    Alumni,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Alumni, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Alumni => "ALUMNI",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Roles a visitor may pick for themselves at registration.
    pub fn is_self_assignable(self) -> bool {
        match self {
            Role::Student | Role::Alumni => true,
            Role::Admin => false,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown role '{s}' (expected one of: STUDENT, ALUMNI, ADMIN)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("alumni".parse::<Role>().unwrap(), Role::Alumni);
        assert_eq!(" ADMIN ".parse::<Role>().unwrap(), Role::Admin);
        assert!("professor".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_as_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Alumni).unwrap(), "\"ALUMNI\"");
    }

    #[test]
    fn admin_is_not_self_assignable() {
        assert!(Role::Student.is_self_assignable());
        assert!(Role::Alumni.is_self_assignable());
        assert!(!Role::Admin.is_self_assignable());
    }
}
