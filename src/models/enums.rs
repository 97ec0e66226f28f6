use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Severity {
    None => "none",
    Moderate => "moderate",
    Severe => "severe",
});

str_enum!(AlertState {
    Created => "created",
    StepActive => "step_active",
    Acknowledged => "acknowledged",
    Exhausted => "exhausted",
});

impl AlertState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertState::Acknowledged | AlertState::Exhausted)
    }
}

str_enum!(RecipientTier {
    OrderingPhysician => "ordering_physician",
    BackupPhysician => "backup_physician",
    DepartmentHead => "department_head",
    Administrator => "administrator",
});

str_enum!(Channel {
    Sms => "sms",
    Push => "push",
    Phone => "phone",
    Email => "email",
});

str_enum!(DeliveryStatus {
    Delivered => "delivered",
    Failed => "failed",
});
