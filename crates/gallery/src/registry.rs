use std::collections::BTreeMap;

use foundation::PanoramaId;
use streaming::LoadTracker;

use crate::platform::Platform;
use crate::resource::PanoramaResource;

/// Id-indexed store of panorama resources.
///
/// Besides the resources themselves it keeps registration order (used to
/// pick capture neighbors) and the table of in-flight texture loads.
pub struct Registry<P: Platform> {
    resources: BTreeMap<PanoramaId, PanoramaResource<P>>,
    order: Vec<PanoramaId>,
    next_generation: u64,
    pub loads: LoadTracker<PanoramaId>,
}

impl<P: Platform> Default for Registry<P> {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            order: Vec::new(),
            next_generation: 1,
            loads: LoadTracker::new(),
        }
    }
}

impl<P: Platform> Registry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_generation(&mut self) -> u64 {
        let g = self.next_generation;
        self.next_generation += 1;
        g
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, id: &PanoramaId) -> bool {
        self.resources.contains_key(id)
    }

    /// Adds `resource`, appending its id to the registration order.
    pub fn insert(&mut self, resource: PanoramaResource<P>) {
        let id = resource.id.clone();
        if self.resources.insert(id.clone(), resource).is_none() {
            self.order.push(id);
        }
    }

    /// Removes the resource and cancels its pending loads.
    pub fn remove(&mut self, id: &PanoramaId) -> Option<PanoramaResource<P>> {
        let resource = self.resources.remove(id)?;
        self.order.retain(|o| o != id);
        self.loads.cancel_owner(id);
        Some(resource)
    }

    pub fn get(&self, id: &PanoramaId) -> Option<&PanoramaResource<P>> {
        self.resources.get(id)
    }

    pub fn get_mut(&mut self, id: &PanoramaId) -> Option<&mut PanoramaResource<P>> {
        self.resources.get_mut(id)
    }

    /// The resource, but only if it is still the instance from `generation`.
    pub fn get_live_mut(
        &mut self,
        id: &PanoramaId,
        generation: u64,
    ) -> Option<&mut PanoramaResource<P>> {
        self.resources
            .get_mut(id)
            .filter(|r| r.generation == generation)
    }

    pub fn is_live(&self, id: &PanoramaId, generation: u64) -> bool {
        self.resources
            .get(id)
            .is_some_and(|r| r.generation == generation)
    }

    pub fn ids(&self) -> &[PanoramaId] {
        &self.order
    }

    pub fn index_of(&self, id: &PanoramaId) -> Option<usize> {
        self.order.iter().position(|o| o == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PanoramaResource<P>> {
        self.order.iter().filter_map(|id| self.resources.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PanoramaResource<P>> {
        self.resources.values_mut()
    }

    /// Up to `before` ids preceding and `after` ids following `id`, nearest
    /// first within each side: `[i-before, i)` then `(i, i+after]`.
    pub fn neighbors(&self, id: &PanoramaId, before: usize, after: usize) -> Vec<PanoramaId> {
        let Some(i) = self.index_of(id) else {
            return Vec::new();
        };
        let start = i.saturating_sub(before);
        let end = (i + 1 + after).min(self.order.len());
        self.order[start..i]
            .iter()
            .chain(self.order[i + 1..end].iter())
            .cloned()
            .collect()
    }
}
