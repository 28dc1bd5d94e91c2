use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseKindError;

/// Where an installation keeps its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilestoreKind {
    /// MinIO run inside the cluster by its operator.
    MinioOperator,
    /// A dedicated S3 bucket.
    AwsS3,
}

impl FilestoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MinioOperator => "minio-operator",
            Self::AwsS3 => "aws-s3",
        }
    }
}

impl FromStr for FilestoreKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minio-operator" => Ok(Self::MinioOperator),
            "aws-s3" => Ok(Self::AwsS3),
            other => Err(ParseKindError::new("filestore", other)),
        }
    }
}

impl fmt::Display for FilestoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_supported_filestore(raw: &str) -> bool {
    raw.parse::<FilestoreKind>().is_ok()
}
