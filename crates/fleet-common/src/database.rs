use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseKindError;

/// Where an installation keeps its relational data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatabaseKind {
    /// MySQL run inside the cluster by its operator.
    MysqlOperator,
    /// A dedicated RDS database.
    AwsRds,
}

impl DatabaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MysqlOperator => "mysql-operator",
            Self::AwsRds => "aws-rds",
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql-operator" => Ok(Self::MysqlOperator),
            "aws-rds" => Ok(Self::AwsRds),
            other => Err(ParseKindError::new("database", other)),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_supported_database(raw: &str) -> bool {
    raw.parse::<DatabaseKind>().is_ok()
}
