//! 讲解缓存：subject_key -> (Level -> ExplanationResult)
//!
//! 编排器各持有一个「自定义文本」实例和一个「论文 id」实例，两类键互不混用。
//! 可选的 max_subjects 上限按主题插入顺序淘汰最早的主题。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::model::{ExplanationResult, Level};

#[derive(Debug, Default)]
pub struct ExplanationCache {
    entries: HashMap<String, HashMap<Level, Arc<ExplanationResult>>>,
    /// 主题首次插入的顺序，用于上限淘汰
    order: VecDeque<String>,
    max_subjects: Option<usize>,
}

impl ExplanationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 限制缓存的主题数（0 视为不限）
    pub fn with_max_subjects(mut self, max_subjects: Option<usize>) -> Self {
        self.max_subjects = max_subjects.filter(|n| *n > 0);
        self
    }

    pub fn get(&self, subject_key: &str, level: Level) -> Option<Arc<ExplanationResult>> {
        self.entries
            .get(subject_key)
            .and_then(|levels| levels.get(&level))
            .cloned()
    }

    pub fn has(&self, subject_key: &str, level: Level) -> bool {
        self.entries
            .get(subject_key)
            .is_some_and(|levels| levels.contains_key(&level))
    }

    /// 插入或覆盖；主题的内层映射按需创建
    pub fn put(&mut self, subject_key: &str, level: Level, result: Arc<ExplanationResult>) {
        if !self.entries.contains_key(subject_key) {
            self.evict_for_new_subject();
            self.order.push_back(subject_key.to_string());
        }
        self.entries
            .entry(subject_key.to_string())
            .or_default()
            .insert(level, result);
    }

    /// 已缓存的层级
    pub fn levels_for(&self, subject_key: &str) -> Vec<Level> {
        self.entries
            .get(subject_key)
            .map(|levels| levels.keys().copied().collect())
            .unwrap_or_default()
    }

    /// 某层级下已缓存的所有主题键
    pub fn keys_with_level(&self, level: Level) -> Vec<String> {
        self.order
            .iter()
            .filter(|key| self.has(key, level))
            .cloned()
            .collect()
    }

    /// 已填充的 (主题, 层级) 槽位数
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn evict_for_new_subject(&mut self) {
        let Some(max) = self.max_subjects else {
            return;
        };
        while self.entries.len() >= max {
            match self.order.pop_front() {
                Some(oldest) => {
                    tracing::debug!("Evicting cached explanations for {}", oldest);
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(takeaway: &str) -> Arc<ExplanationResult> {
        Arc::new(ExplanationResult {
            topics: vec![],
            main_takeaway: takeaway.to_string(),
        })
    }

    #[test]
    fn test_get_put_has() {
        let mut cache = ExplanationCache::new();
        assert!(!cache.has("abc", Level::Basic));
        assert!(cache.get("abc", Level::Basic).is_none());

        cache.put("abc", Level::Basic, result("X"));
        assert!(cache.has("abc", Level::Basic));
        assert!(!cache.has("abc", Level::Graduate));
        assert_eq!(cache.get("abc", Level::Basic).unwrap().main_takeaway, "X");
    }

    #[test]
    fn test_levels_are_independent_axes() {
        let mut cache = ExplanationCache::new();
        cache.put("abc", Level::Basic, result("basic"));
        cache.put("abc", Level::College, result("college"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("abc", Level::College).unwrap().main_takeaway, "college");

        let mut levels = cache.levels_for("abc");
        levels.sort_by_key(|l| l.as_str());
        assert_eq!(levels, vec![Level::Basic, Level::College]);
        assert!(cache.levels_for("missing").is_empty());
    }

    #[test]
    fn test_put_overwrites_slot() {
        let mut cache = ExplanationCache::new();
        cache.put("abc", Level::Basic, result("old"));
        cache.put("abc", Level::Basic, result("new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("abc", Level::Basic).unwrap().main_takeaway, "new");
    }

    #[test]
    fn test_max_subjects_evicts_oldest_subject() {
        let mut cache = ExplanationCache::new().with_max_subjects(Some(2));
        cache.put("a", Level::Basic, result("a"));
        cache.put("b", Level::Basic, result("b"));
        cache.put("a", Level::Graduate, result("a2"));
        cache.put("c", Level::Basic, result("c"));

        assert!(!cache.has("a", Level::Basic));
        assert!(!cache.has("a", Level::Graduate));
        assert!(cache.has("b", Level::Basic));
        assert!(cache.has("c", Level::Basic));
    }

    #[test]
    fn test_zero_max_subjects_means_unbounded() {
        let mut cache = ExplanationCache::new().with_max_subjects(Some(0));
        for i in 0..10 {
            cache.put(&i.to_string(), Level::Basic, result("x"));
        }
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn test_keys_with_level_and_clear() {
        let mut cache = ExplanationCache::new();
        cache.put("p1", Level::Basic, result("1"));
        cache.put("p2", Level::College, result("2"));
        cache.put("p3", Level::Basic, result("3"));
        assert_eq!(cache.keys_with_level(Level::Basic), vec!["p1", "p3"]);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys_with_level(Level::Basic).is_empty());
    }
}
