use std::collections::BTreeSet;

use taskmon_core::traits::TaskRegistry;

/// 启动时由配置填充的任务注册表
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRegistry {
    names: BTreeSet<String>,
}

impl InMemoryTaskRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.trim().is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
