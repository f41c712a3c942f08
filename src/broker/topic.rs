use std::collections::HashSet;

pub type ConsumerId = u64;

/// A broker-side topic: the set of consumers attached to one topic name.
///
/// Duplicate attaches are a no-op. Callers synchronize access through the
/// broker lock.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    pub consumers: HashSet<ConsumerId>,
}

impl Topic {
    /// Creates a new topic with the given name and no consumers.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            consumers: HashSet::new(),
        }
    }

    pub fn attach(&mut self, id: ConsumerId) {
        self.consumers.insert(id);
    }

    pub fn detach(&mut self, id: ConsumerId) {
        self.consumers.remove(&id);
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}
