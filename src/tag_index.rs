use std::collections::HashMap;
use std::collections::HashSet;

/// Reverse index from a tag to the keys carrying it. A tag with no keys left is dropped from the index.
#[derive(Debug, Default)]
pub(crate) struct TagIndex {
    keys_by_tag: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub(crate) fn add(&mut self, tag: &str, key: &str) {
        self.keys_by_tag
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
    }

    pub(crate) fn remove(&mut self, tag: &str, key: &str) {
        if let Some(keys) = self.keys_by_tag.get_mut(tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.keys_by_tag.remove(tag);
            }
        }
    }

    pub(crate) fn add_all<'a, I>(&mut self, tags: I, key: &str)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            self.add(tag, key);
        }
    }

    pub(crate) fn remove_all<'a, I>(&mut self, tags: I, key: &str)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            self.remove(tag, key);
        }
    }

    pub(crate) fn keys_for(&self, tag: &str) -> Vec<String> {
        self.keys_by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, tag: &str, key: &str) -> bool {
        self.keys_by_tag.get(tag).is_some_and(|keys| keys.contains(key))
    }

    pub(crate) fn tag_count(&self) -> usize {
        self.keys_by_tag.len()
    }

    pub(crate) fn clear(&mut self) {
        self.keys_by_tag.clear();
    }
}
