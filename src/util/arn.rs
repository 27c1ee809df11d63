//! CodeBuild ARN parsing
//!
//! A build ARN has the form
//! `arn:partition:service:region:account:resource-type:resource-id`, e.g.
//! `arn:aws:codebuild:eu-west-2:000000000000:build/project:example-build-id`.
//! The region and account segments feed private registry resolution, and the
//! project/build id segments feed the build console deep link.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArnError {
    #[error("malformed ARN {arn:?}: expected 7 colon-separated segments, found {segments}")]
    Malformed { arn: String, segments: usize },
}

/// A parsed CodeBuild build ARN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    source: String,
    partition: String,
    service: String,
    region: String,
    account_id: String,
    project: String,
    build_id: String,
}

impl Arn {
    pub fn parse(arn: &str) -> Result<Self, ArnError> {
        let segments: Vec<&str> = arn.split(':').collect();
        if segments.len() != 7 {
            return Err(ArnError::Malformed {
                arn: arn.to_string(),
                segments: segments.len(),
            });
        }

        Ok(Self {
            source: arn.to_string(),
            partition: segments[1].to_string(),
            service: segments[2].to_string(),
            region: segments[3].to_string(),
            account_id: segments[4].to_string(),
            project: segments[5].to_string(),
            build_id: segments[6].to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Resource segment, e.g. `build/project`
    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }
}
