//! `runner` relation (provides side): tells CI runners where GitLab lives

use tracing::info;

use super::RelationError;
use crate::host::Relation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    pub url: String,
    pub token: Option<String>,
}

pub struct RunnerProvides<'a> {
    relation: &'a mut dyn Relation,
}

impl<'a> RunnerProvides<'a> {
    pub fn new(relation: &'a mut dyn Relation) -> Self {
        Self { relation }
    }

    pub fn publish(&mut self, settings: &RunnerSettings) -> Result<(), RelationError> {
        let mut pairs = vec![("url", settings.url.clone())];
        if let Some(token) = settings.token.as_ref().filter(|t| !t.is_empty()) {
            pairs.push(("token", token.clone()));
        }
        self.relation.set_local(&pairs)?;
        info!(url = %settings.url, "Published GitLab endpoint to runner");
        Ok(())
    }
}
