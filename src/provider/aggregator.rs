//! Fan-out of one logical fetch to the providers that own each name

use crate::cache::types::{PropertyBag, PropertyName};
use crate::error::{MetadataError, Result};
use crate::provider::{PropertyProvider, PropertyRequest};
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes property names to their declaring provider and merges the answers
///
/// The vocabulary is closed when the aggregator is built: every name belongs
/// to exactly one provider, and names outside the vocabulary are rejected by
/// [`check_property_names`](Self::check_property_names).
pub struct ProviderAggregator {
    providers: Vec<Arc<dyn PropertyProvider>>,

    /// Property name -> index into `providers`
    owners: HashMap<PropertyName, usize>,
}

impl ProviderAggregator {
    /// Build the aggregator, failing if two providers declare the same name
    pub fn new(providers: Vec<Arc<dyn PropertyProvider>>) -> Result<Self> {
        let mut owners = HashMap::new();

        for (index, provider) in providers.iter().enumerate() {
            for name in provider.property_names() {
                if let Some(&existing) = owners.get(&name) {
                    let owner: &Arc<dyn PropertyProvider> = &providers[existing];
                    return Err(MetadataError::DuplicatePropertyName {
                        name: name.to_string(),
                        provider: owner.name().to_string(),
                    });
                }
                owners.insert(name, index);
            }
        }

        info!(
            "Registered {} metadata providers declaring {} properties",
            providers.len(),
            owners.len()
        );

        Ok(Self { providers, owners })
    }

    /// Reject any name no provider declared
    pub fn check_property_names(&self, names: &[PropertyName]) -> Result<()> {
        match names.iter().find(|name| !self.owners.contains_key(*name)) {
            Some(name) => Err(MetadataError::InvalidPropertyName {
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Fetch every request, one bag per request in input order
    ///
    /// Never fails. Providers that are unavailable, decline an entry, error
    /// out, panic or answer with the wrong shape simply contribute nothing,
    /// which the caller turns into absent values.
    pub async fn get(&self, requests: &[PropertyRequest]) -> Vec<PropertyBag> {
        let mut results = vec![PropertyBag::new(); requests.len()];
        let mut batches = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            let mut positions = Vec::new();
            let mut sub_requests = Vec::new();

            for (position, request) in requests.iter().enumerate() {
                let names: Vec<PropertyName> = request
                    .names
                    .iter()
                    .filter(|name| self.owners.get(*name) == Some(&index))
                    .cloned()
                    .collect();
                if names.is_empty() || !provider.supports(&request.entry) {
                    continue;
                }
                positions.push(position);
                sub_requests.push(PropertyRequest::new(request.entry.clone(), names));
            }

            if sub_requests.is_empty() {
                continue;
            }
            if !provider.is_available() {
                debug!("Provider {} unavailable, treating its properties as absent", provider.name());
                continue;
            }
            batches.push((provider, positions, sub_requests));
        }

        let answers = join_all(
            batches
                .iter()
                .map(|(provider, _, sub_requests)| AssertUnwindSafe(provider.get(sub_requests)).catch_unwind()),
        )
        .await;

        for ((provider, positions, sub_requests), answer) in batches.iter().zip(answers) {
            let bags = match answer {
                Ok(Ok(bags)) if bags.len() == sub_requests.len() => bags,
                Ok(Ok(bags)) => {
                    warn!(
                        "Provider {} returned {} results for {} requests, ignoring them",
                        provider.name(),
                        bags.len(),
                        sub_requests.len()
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    warn!("Provider {} failed: {}", provider.name(), e);
                    continue;
                }
                Err(_) => {
                    warn!("Provider {} panicked, treating its properties as absent", provider.name());
                    continue;
                }
            };

            for ((&position, request), bag) in positions.iter().zip(sub_requests).zip(bags) {
                for name in &request.names {
                    let value = bag.get(name);
                    if !value.is_unknown() {
                        results[position].insert(name.clone(), value.clone());
                    }
                }
            }
        }

        results
    }
}
