use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use taskmon_core::MonitorError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("未找到资源")]
    NotFound,
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Monitor(e) => match e {
                MonitorError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
                MonitorError::WorkerNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "WORKER_NOT_FOUND")
                }
                MonitorError::ScheduleNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "SCHEDULE_NOT_FOUND")
                }
                MonitorError::InvalidCron { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_CRON_EXPRESSION")
                }
                MonitorError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
                MonitorError::Serialization(_) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
                MonitorError::UpstreamUnavailable(_) | MonitorError::MessageQueue(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE")
                }
                MonitorError::StaleEvent { .. }
                | MonitorError::Configuration(_)
                | MonitorError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status_and_type().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("请求处理失败: {}", self);
            "系统内部错误".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_errors_map_to_status_codes() {
        let cases = [
            (
                MonitorError::TaskNotFound {
                    task_id: "t1".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                MonitorError::WorkerNotFound {
                    hostname: "celery@a".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                MonitorError::invalid_argument("目标集合为空"),
                StatusCode::BAD_REQUEST,
            ),
            (
                MonitorError::InvalidCron {
                    expr: "* * *".to_string(),
                    message: "字段不足".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (MonitorError::upstream("连接超时"), StatusCode::SERVICE_UNAVAILABLE),
            (
                MonitorError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::NotFound.to_string(), "未找到资源");
        let error = ApiError::from(MonitorError::TaskNotFound {
            task_id: "t9".to_string(),
        });
        assert_eq!(error.to_string(), "任务未找到: t9");
    }
}
