//! The process-wide store of compiled request templates.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::{
    contract::MethodDescriptor,
    request::{ContractError, RequestTemplate},
};

/// Identifies one service created by [`Flare::create`](crate::Flare::create).
///
/// Two services built from contracts with the same name still get distinct
/// ids, so their templates never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ServiceId(u64);

type Key = (ServiceId, String);

/// Compiled templates keyed by service and method name.
///
/// Clones share the same store. Concurrent first lookups of one method may
/// both compile it; the first insert wins and the others are dropped.
#[derive(Debug, Clone, Default)]
pub(crate) struct TemplateCache {
    templates: Arc<DashMap<Key, Arc<RequestTemplate>>>,
    next_id: Arc<AtomicU64>,
}

impl TemplateCache {
    /// Allocates a fresh service id.
    pub(crate) fn register(&self) -> ServiceId {
        ServiceId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the template for `descriptor`, compiling it on a miss.
    pub(crate) fn get_or_compile(
        &self,
        service: ServiceId,
        contract: &str,
        descriptor: &MethodDescriptor,
    ) -> Result<Arc<RequestTemplate>, ContractError> {
        let key = (service, descriptor.name.clone());
        if let Some(template) = self.templates.get(&key).map(|entry| entry.value().clone()) {
            tracing::trace!(contract, method = %descriptor.name, "Template cache hit");
            return Ok(template);
        }

        let template = Arc::new(compile(contract, descriptor)?);
        Ok(self.templates.entry(key).or_insert(template).value().clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.templates.len()
    }
}

fn compile(contract: &str, descriptor: &MethodDescriptor) -> Result<RequestTemplate, ContractError> {
    let template = RequestTemplate::compile(descriptor)?;
    tracing::debug!(
        contract,
        method = %descriptor.name,
        verb = %template.verb(),
        path = template.path(),
        "Compiled request template"
    );
    Ok(template)
}
