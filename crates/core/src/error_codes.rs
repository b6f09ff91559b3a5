//! 错误码表
//!
//! 所有对外暴露的错误码集中登记在 [`ERROR_CODES`] 中，启动时通过
//! [`validate_error_codes`] 检查唯一性。
//!
//! 号段划分：
//! - 100xx 通用错误
//! - 200xx 存储错误
//! - 300xx 校验错误
//! - 400xx 消息队列错误
//! - 600xx 任务执行错误

use std::collections::HashSet;

use crate::errors::{ProcessorError, ProcessorResult};

pub const MIN_ERROR_CODE: u32 = 10000;
pub const MAX_ERROR_CODE: u32 = 99999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Internal,
    Configuration,
    Serialization,
    Store,
    TaskNotFound,
    InvalidOrderColumn,
    InvalidOrderDirection,
    Validation,
    InvalidTaskParams,
    Broker,
    TaskExecution,
    HandlerNotFound,
    CancellationRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCodeEntry {
    pub kind: ErrorKind,
    pub code: u32,
    pub http_status: u16,
    pub name: &'static str,
}

const fn entry(kind: ErrorKind, code: u32, http_status: u16, name: &'static str) -> ErrorCodeEntry {
    ErrorCodeEntry {
        kind,
        code,
        http_status,
        name,
    }
}

pub const ERROR_CODES: &[ErrorCodeEntry] = &[
    entry(ErrorKind::Internal, 10000, 500, "InternalError"),
    entry(ErrorKind::Configuration, 10001, 500, "ConfigurationError"),
    entry(ErrorKind::Serialization, 10002, 500, "SerializationError"),
    entry(ErrorKind::Store, 20000, 500, "UnknownDatabaseError"),
    entry(ErrorKind::TaskNotFound, 20001, 404, "EntryWithIDNotExist"),
    entry(ErrorKind::InvalidOrderColumn, 20002, 400, "OrderColumnNotExist"),
    entry(ErrorKind::InvalidOrderDirection, 20003, 400, "InvalidOrderDirection"),
    entry(ErrorKind::Validation, 30000, 422, "InvalidDataFormat"),
    entry(ErrorKind::InvalidTaskParams, 30001, 422, "InvalidTaskParameters"),
    entry(ErrorKind::Broker, 40000, 503, "BrokerUnavailable"),
    entry(ErrorKind::TaskExecution, 60000, 500, "JobRuntimeError"),
    entry(ErrorKind::HandlerNotFound, 60001, 500, "HandlerNotFound"),
    entry(ErrorKind::CancellationRejected, 60002, 409, "CancellationRejected"),
];

impl ErrorKind {
    pub fn entry(self) -> &'static ErrorCodeEntry {
        ERROR_CODES
            .iter()
            .find(|e| e.kind == self)
            .unwrap_or(&ERROR_CODES[0])
    }

    pub fn code(self) -> u32 {
        self.entry().code
    }

    pub fn from_code(code: u32) -> Option<ErrorKind> {
        ERROR_CODES.iter().find(|e| e.code == code).map(|e| e.kind)
    }
}

/// 校验错误码表：码值唯一、种类唯一、且落在合法号段内
pub fn validate_error_table(entries: &[ErrorCodeEntry]) -> ProcessorResult<()> {
    let mut codes = HashSet::new();
    let mut kinds = HashSet::new();

    for e in entries {
        if !(MIN_ERROR_CODE..=MAX_ERROR_CODE).contains(&e.code) {
            return Err(ProcessorError::Configuration(format!(
                "error code {} of {} is outside {MIN_ERROR_CODE}..={MAX_ERROR_CODE}",
                e.code, e.name
            )));
        }
        if !codes.insert(e.code) {
            return Err(ProcessorError::Configuration(format!(
                "error code {} is duplicated ({})",
                e.code, e.name
            )));
        }
        if !kinds.insert(e.kind) {
            return Err(ProcessorError::Configuration(format!(
                "error kind {:?} is registered twice",
                e.kind
            )));
        }
    }

    Ok(())
}

pub fn validate_error_codes() -> ProcessorResult<()> {
    validate_error_table(ERROR_CODES)
}
