use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use super::{RegistryError, TaskRegistry};
use crate::bench::core::types::{TaskCategory, TaskParams, TaskSpec};

/// 根据任务 id 前缀推断类别
///
/// `Recipe*` -> recipe，`SimpleCalendar*` / `Calendar*` -> calendar，
/// `System*` -> system，其余取首个单词的小写形式。
pub fn infer_category(task_id: &str) -> TaskCategory {
    let rules: [(&str, TaskCategory); 3] = [
        (r"^Recipe", TaskCategory::Recipe),
        (r"^(Simple)?Calendar", TaskCategory::Calendar),
        (r"^System", TaskCategory::System),
    ];

    for (pattern, category) in rules {
        if Regex::new(pattern).map(|re| re.is_match(task_id)).unwrap_or(false) {
            return category;
        }
    }

    let leading = Regex::new(r"^[A-Za-z][a-z0-9]*")
        .ok()
        .and_then(|re| re.find(task_id).map(|m| m.as_str().to_lowercase()));

    TaskCategory::Other(leading.unwrap_or_else(|| "unknown".to_string()))
}

#[derive(Debug, Deserialize)]
struct CatalogueFile {
    #[serde(default)]
    tasks: Vec<CatalogueEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogueEntry {
    id: String,
    category: Option<TaskCategory>,
    #[serde(default)]
    params: TaskParams,
}

/// 内存中的静态任务目录
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    tasks: Vec<TaskSpec>,
    index: HashMap<String, usize>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由任务列表构建，id 不可重复
    pub fn from_specs(specs: impl IntoIterator<Item = TaskSpec>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, spec: TaskSpec) -> Result<(), RegistryError> {
        if spec.id.trim().is_empty() {
            return Err(RegistryError::InvalidEntry("任务 id 不能为空".to_string()));
        }
        if self.index.contains_key(&spec.id) {
            return Err(RegistryError::DuplicateTask(spec.id));
        }

        debug!("注册任务: {} [{}]", spec.id, spec.category);
        self.index.insert(spec.id.clone(), self.tasks.len());
        self.tasks.push(spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    /// 从 TOML 目录文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| RegistryError::IoError(format!("{}: {}", path.display(), e)))?;

        let registry = Self::from_toml(&content)?;
        info!("从 {} 加载了 {} 个任务", path.display(), registry.len());
        Ok(registry)
    }

    pub fn from_toml(content: &str) -> Result<Self, RegistryError> {
        let file: CatalogueFile =
            toml::from_str(content).map_err(|e| RegistryError::ParseError(e.to_string()))?;

        Self::from_specs(file.tasks.into_iter().map(|entry| {
            let category = entry.category.unwrap_or_else(|| infer_category(&entry.id));
            TaskSpec {
                id: entry.id,
                category,
                params: entry.params,
            }
        }))
    }

    /// 内置任务目录
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_specs(builtin_tasks())
    }
}

impl TaskRegistry for StaticRegistry {
    fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    fn lookup(&self, task_id: &str) -> Option<TaskSpec> {
        self.index.get(task_id).map(|&i| self.tasks[i].clone())
    }
}

fn task(id: &str) -> TaskSpec {
    TaskSpec::new(id, infer_category(id))
}

fn builtin_tasks() -> Vec<TaskSpec> {
    vec![
        task("RecipeAddSingleRecipe")
            .with_param("recipe_name", json!("Spaghetti Carbonara"))
            .with_param("ingredients", json!(["spaghetti", "eggs", "pecorino", "guanciale"]))
            .with_param("instructions", json!("Cook pasta, mix with eggs and cheese")),
        task("RecipeAddMultipleRecipes")
            .with_param("recipe_name", json!("Pancakes"))
            .with_param("ingredients", json!(["flour", "milk", "eggs"])),
        task("RecipeAddMultipleRecipesFromMarkor")
            .with_param("recipe_name", json!("Tomato Soup"))
            .with_param("ingredients", json!(["tomatoes", "onion", "stock"])),
        task("SimpleCalendarAddOneEvent")
            .with_param("event_title", json!("Team Meeting"))
            .with_param("event_date", json!("2023-10-15 10:00")),
        task("SimpleCalendarAddOneEventTomorrow")
            .with_param("event_title", json!("Dentist")),
        task("SimpleCalendarAddRepeatingEvent")
            .with_param("event_title", json!("Weekly Sync"))
            .with_param("event_date", json!("2023-10-16 09:30")),
        task("SystemWifiTurnOn").with_param("target", json!([960, 420])),
        task("SystemWifiTurnOff").with_param("target", json!([960, 420])),
        task("SystemBluetoothTurnOn").with_param("target", json!([960, 620])),
        task("SystemBluetoothTurnOff").with_param("target", json!([960, 620])),
        task("SystemBrightnessMax"),
    ]
}
