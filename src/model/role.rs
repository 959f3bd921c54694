use serde::Serialize;

/// Role id carried in the access token's `role` claim.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    System = 4,
    ApiUser = 5,
}

impl TryFrom<u8> for Role {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Role::Admin),
            2 => Ok(Role::Hr),
            3 => Ok(Role::Employee),
            4 => Ok(Role::System),
            5 => Ok(Role::ApiUser),
            other => Err(other),
        }
    }
}

impl Role {
    /// May review leave and read other employees' attendance and leave.
    pub fn is_hr_or_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Hr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip() {
        for role in [Role::Admin, Role::Hr, Role::Employee, Role::System, Role::ApiUser] {
            assert_eq!(Role::try_from(role as u8), Ok(role));
        }
        assert_eq!(Role::try_from(9), Err(9));
        assert!(Role::Hr.is_hr_or_admin());
        assert!(!Role::Employee.is_hr_or_admin());
    }
}
