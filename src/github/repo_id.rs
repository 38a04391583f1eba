use crate::Result;
use core::fmt::{Display, Formatter};
use ohno::bail;
use serde::{Deserialize, Serialize};

/// A repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    owner: Box<str>,
    name: Box<str>,
}

impl RepoId {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut segments = spec.split('/');
        let (Some(owner), Some(name), None) = (segments.next(), segments.next(), segments.next())
        else {
            bail!("repository must be in 'owner/name' form: '{spec}'");
        };

        let name = name.trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() {
            bail!("repository has an empty owner or name: '{spec}'");
        }

        Ok(Self {
            owner: Box::from(owner),
            name: Box::from(name),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for RepoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
