use std::collections::BTreeMap;

pub const DEFAULT_MINIMUM_MATCH: usize = 3;

/// Category name -> known values, with unique-prefix canonicalization.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Vec<String>>,
    minimum_match: usize,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_MATCH)
    }
}

impl EntityRegistry {
    pub fn new(minimum_match: usize) -> Self {
        Self {
            entities: BTreeMap::new(),
            minimum_match: minimum_match.max(1),
        }
    }

    pub fn minimum_match(&self) -> usize {
        self.minimum_match
    }

    pub fn register(&mut self, category: &str, value: &str) {
        let values = self.entities.entry(category.to_string()).or_default();
        if !values.iter().any(|known| known == value) {
            values.push(value.to_string());
        }
    }

    pub fn values(&self, category: &str) -> &[String] {
        self.entities
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn exact_match(&self, category: &str, value: &str) -> bool {
        self.values(category).iter().any(|known| known == value)
    }

    pub fn canonicalize(&self, category: &str, value: &str) -> Option<String> {
        let values = self.values(category);
        if values.iter().any(|known| known == value) {
            return Some(value.to_string());
        }
        match auto_complete(value, values, self.minimum_match).as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        }
    }
}

/// Every candidate `partial` abbreviates. An exact hit short-circuits to itself.
pub fn auto_complete(partial: &str, candidates: &[String], minimum: usize) -> Vec<String> {
    let length = partial.chars().count();
    let mut matches = Vec::new();
    for candidate in candidates {
        if candidate == partial {
            return vec![candidate.clone()];
        }
        if length >= minimum
            && length <= candidate.chars().count()
            && candidate.starts_with(partial)
        {
            matches.push(candidate.clone());
        }
    }
    matches
}
