use serde::{Deserialize, Serialize};

/// Base role assigned to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Student,
    Recruiter,
    Instructor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Guest,
        Role::Student,
        Role::Recruiter,
        Role::Instructor,
        Role::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Student => "student",
            Role::Recruiter => "recruiter",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }

    /// Roles that can only be held after an approved verification request.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Recruiter | Role::Instructor)
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    ///
    /// Admin satisfies every requirement; every other role only satisfies itself.
    pub fn satisfies(self, required: Role) -> bool {
        self == Role::Admin || self == required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(Role::Guest),
            "student" => Ok(Role::Student),
            "recruiter" => Ok(Role::Recruiter),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            _ => Err(crate::AuthzError::InvalidRole(value.to_string())),
        }
    }
}

/// Roles an identity may apply for through a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRole {
    Recruiter,
    Instructor,
}

impl TargetRole {
    pub fn as_str(self) -> &'static str {
        self.role().as_str()
    }

    pub fn role(self) -> Role {
        match self {
            TargetRole::Recruiter => Role::Recruiter,
            TargetRole::Instructor => Role::Instructor,
        }
    }
}

impl From<TargetRole> for Role {
    fn from(value: TargetRole) -> Self {
        value.role()
    }
}

impl TryFrom<Role> for TargetRole {
    type Error = crate::AuthzError;

    fn try_from(value: Role) -> Result<Self, Self::Error> {
        match value {
            Role::Recruiter => Ok(TargetRole::Recruiter),
            Role::Instructor => Ok(TargetRole::Instructor),
            other => Err(crate::AuthzError::InvalidTargetRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for TargetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetRole {
    type Err = crate::AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let role: Role = value.parse()?;
        TargetRole::try_from(role)
    }
}

/// Verification state carried on an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = crate::AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "unverified" => Ok(VerificationStatus::Unverified),
            "pending" => Ok(VerificationStatus::Pending),
            "verified" => Ok(VerificationStatus::Verified),
            "rejected" => Ok(VerificationStatus::Rejected),
            _ => Err(crate::AuthzError::InvalidStatus(value.to_string())),
        }
    }
}
