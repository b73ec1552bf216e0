//! 任务类别到固定操作序列的映射
//!
//! 每个类别对应一个确定的 OperationRequest 序列，参数缺失时使用默认值，
//! 参数类型错误时返回配置错误。

use tracing::debug;
use crate::bench::core::traits::OperationRequest;
use crate::bench::core::types::{TaskCategory, TaskParams, TaskSpec};
use crate::error::AppError;

pub const RECIPE_APP: &str = "com.flauschcode.broccoli";
pub const CALENDAR_APP: &str = "com.simplemobiletools.calendar.pro";
pub const SETTINGS_APP: &str = "com.android.settings";

/// "添加"按钮坐标
pub const ADD_BUTTON: (u32, u32) = (500, 1200);
/// "保存"按钮坐标
pub const SAVE_BUTTON: (u32, u32) = (500, 1400);

/// 坐标上限，超出视为参数错误
const MAX_COORDINATE: u32 = 10000;

/// 解析任务对应的操作序列
pub fn resolve_plan(spec: &TaskSpec) -> Result<Vec<OperationRequest>, AppError> {
    let plan = match &spec.category {
        TaskCategory::Recipe => recipe_plan(&spec.params)?,
        TaskCategory::Calendar => calendar_plan(&spec.params)?,
        TaskCategory::System => system_plan(&spec.params)?,
        TaskCategory::Other(tag) => {
            return Err(AppError::UnknownTask(format!(
                "{}: 类别 '{}' 没有对应的操作序列",
                spec.id, tag
            )));
        }
    };

    if plan.is_empty() {
        return Err(AppError::UnknownTask(format!("{}: 操作序列为空", spec.id)));
    }

    debug!("任务 {} 解析为 {} 个操作", spec.id, plan.len());
    Ok(plan)
}

fn tap((x, y): (u32, u32)) -> OperationRequest {
    OperationRequest::Tap { x, y }
}

fn type_text(text: String) -> OperationRequest {
    OperationRequest::TypeText { text }
}

fn launch(package: String) -> OperationRequest {
    OperationRequest::LaunchApp { package }
}

/// 添加食谱：启动应用、点击添加、输入名称和配料、（可选）输入步骤、点击保存
fn recipe_plan(params: &TaskParams) -> Result<Vec<OperationRequest>, AppError> {
    let mut plan = vec![
        launch(string_param(params, "recipe_app")?.unwrap_or_else(|| RECIPE_APP.to_string())),
        tap(ADD_BUTTON),
        type_text(string_param(params, "recipe_name")?.unwrap_or_else(|| "Test Recipe".to_string())),
        type_text(list_param(params, "ingredients")?.unwrap_or_else(|| "ingredient1, ingredient2".to_string())),
    ];

    if let Some(instructions) = string_param(params, "instructions")? {
        plan.push(type_text(instructions));
    }

    plan.push(tap(SAVE_BUTTON));
    Ok(plan)
}

/// 添加日历事件：启动应用、点击添加、输入标题、（可选）输入日期、点击保存
fn calendar_plan(params: &TaskParams) -> Result<Vec<OperationRequest>, AppError> {
    let mut plan = vec![
        launch(string_param(params, "calendar_app")?.unwrap_or_else(|| CALENDAR_APP.to_string())),
        tap(ADD_BUTTON),
        type_text(string_param(params, "event_title")?.unwrap_or_else(|| "Test Event".to_string())),
    ];

    if let Some(date) = string_param(params, "event_date")? {
        plan.push(type_text(date));
    }

    plan.push(tap(SAVE_BUTTON));
    Ok(plan)
}

/// 系统设置：启动设置、（可选）点击目标开关、查询状态
fn system_plan(params: &TaskParams) -> Result<Vec<OperationRequest>, AppError> {
    let mut plan = vec![launch(
        string_param(params, "settings_app")?.unwrap_or_else(|| SETTINGS_APP.to_string()),
    )];

    if let Some(target) = point_param(params, "target")? {
        plan.push(tap(target));
    }

    plan.push(OperationRequest::QueryState);
    Ok(plan)
}

fn string_param(params: &TaskParams, key: &str) -> Result<Option<String>, AppError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(AppError::InvalidParams(format!(
            "参数 {} 应为字符串: {}",
            key, other
        ))),
    }
}

/// 字符串数组以 ", " 连接，单个字符串原样返回
fn list_param(params: &TaskParams, key: &str) -> Result<Option<String>, AppError> {
    match params.get(key) {
        Some(serde_json::Value::Array(items)) => {
            let parts = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        AppError::InvalidParams(format!("参数 {} 的元素应为字符串: {}", key, item))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(parts.join(", ")))
        }
        _ => string_param(params, key),
    }
}

/// `[x, y]` 或 `{"x": .., "y": ..}` 形式的坐标
fn point_param(params: &TaskParams, key: &str) -> Result<Option<(u32, u32)>, AppError> {
    let Some(value) = params.get(key) else {
        return Ok(None);
    };

    let coords = match value {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Array(arr) if arr.len() == 2 => (arr[0].as_u64(), arr[1].as_u64()),
        serde_json::Value::Object(obj) => (
            obj.get("x").and_then(|v| v.as_u64()),
            obj.get("y").and_then(|v| v.as_u64()),
        ),
        _ => (None, None),
    };

    match coords {
        (Some(x), Some(y)) if x <= MAX_COORDINATE as u64 && y <= MAX_COORDINATE as u64 => {
            Ok(Some((x as u32, y as u32)))
        }
        _ => Err(AppError::InvalidParams(format!(
            "参数 {} 应为 [x, y] 坐标: {}",
            key, value
        ))),
    }
}
