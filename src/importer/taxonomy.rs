use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    ErrorDetail,
    record::TermList,
    store::{CategoryId, ContentStore, TermId},
};

impl<S: ContentStore> super::Importer<S> {
    /// Maps category names to ids in input order, creating missing categories.
    pub async fn resolve_categories(
        &self,
        names: TermList,
    ) -> Result<Vec<CategoryId>, ErrorDetail> {
        let mut ids = Vec::new();
        for name in names.into_names() {
            let error = |error: S::Error| ErrorDetail::ResolveCategory {
                name: name.clone(),
                error: Box::new(error),
            };
            let id = match self.store.find_category(&name).await.map_err(error)? {
                Some(id) => id,
                None => {
                    let id = self.store.create_category(&name).await.map_err(error)?;
                    info!(%id, category = %name, "created category");
                    id
                }
            };
            ids.push(id);
        }
        Ok(ids)
    }

    /// Maps each taxonomy's term names to term ids, creating missing terms.
    pub async fn resolve_taxonomy(
        &self,
        taxonomies: &Value,
    ) -> Result<IndexMap<String, Vec<TermId>>, ErrorDetail> {
        let Value::Object(taxonomies) = taxonomies else {
            debug!(?taxonomies, "taxonomy input is not a mapping, ignored");
            return Ok(IndexMap::new());
        };

        let mut resolved = IndexMap::new();
        for (taxonomy, terms) in taxonomies {
            let mut ids = Vec::new();
            for name in TermList::from_value(terms).into_names() {
                let error = |error: S::Error| ErrorDetail::ResolveTerm {
                    name: name.clone(),
                    taxonomy: taxonomy.clone(),
                    error: Box::new(error),
                };
                let id = match self.store.find_term(&name, taxonomy).await.map_err(error)? {
                    Some(id) => id,
                    None => {
                        let id = self.store.create_term(&name, taxonomy).await.map_err(error)?;
                        info!(%id, term = %name, taxonomy = %taxonomy, "created term");
                        id
                    }
                };
                ids.push(id);
            }
            resolved.insert(taxonomy.clone(), ids);
        }
        Ok(resolved)
    }
}
