use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, ProcessorResult};
use crate::models::TaskStatus;

pub const DEFAULT_ORDER_BY: &str = "created_at:desc";

/// 可排序的任务列，名称即数据库列名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskColumn {
    Id,
    Type,
    Status,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    EndedAt,
}

impl TaskColumn {
    const ALL: [TaskColumn; 7] = [
        TaskColumn::Id,
        TaskColumn::Type,
        TaskColumn::Status,
        TaskColumn::CreatedAt,
        TaskColumn::UpdatedAt,
        TaskColumn::StartedAt,
        TaskColumn::EndedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskColumn::Id => "id",
            TaskColumn::Type => "type",
            TaskColumn::Status => "status",
            TaskColumn::CreatedAt => "created_at",
            TaskColumn::UpdatedAt => "updated_at",
            TaskColumn::StartedAt => "started_at",
            TaskColumn::EndedAt => "ended_at",
        }
    }

    pub fn parse(name: &str) -> ProcessorResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| ProcessorError::InvalidOrderColumn {
                column: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> ProcessorResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(ProcessorError::InvalidOrderDirection {
                direction: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: TaskColumn,
    pub direction: SortDirection,
}

/// 解析 `"col:dir,col2:dir2"` 形式的排序表达式，方向缺省为 asc
pub fn parse_order_by(expr: &str) -> ProcessorResult<Vec<OrderBy>> {
    expr.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (column, direction) = match part.split_once(':') {
                Some((c, d)) => (c.trim(), SortDirection::parse(d.trim())?),
                None => (part, SortDirection::Asc),
            };
            Ok(OrderBy {
                column: TaskColumn::parse(column)?,
                direction,
            })
        })
        .collect()
}

/// 任务列表查询条件
///
/// `limit` 为 0 表示不限制条数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    #[serde(default)]
    pub statuses: Option<Vec<TaskStatus>>,
}

fn default_order_by() -> String {
    DEFAULT_ORDER_BY.to_string()
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 0,
            order_by: default_order_by(),
            statuses: None,
        }
    }
}

impl TaskQuery {
    pub fn order(&self) -> ProcessorResult<Vec<OrderBy>> {
        parse_order_by(&self.order_by)
    }

    /// 生成 `ORDER BY` 子句，列名和方向均来自白名单
    pub fn order_clause(&self) -> ProcessorResult<String> {
        let order = self.order()?;
        if order.is_empty() {
            return Ok(String::new());
        }
        let parts: Vec<String> = order
            .iter()
            .map(|o| format!("{} {}", o.column.as_str(), o.direction.as_sql()))
            .collect();
        Ok(format!(" ORDER BY {}", parts.join(", ")))
    }

    pub fn with_statuses(mut self, statuses: Vec<TaskStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }
}
