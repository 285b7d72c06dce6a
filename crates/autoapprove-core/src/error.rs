//! AUTOAPPROVE 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 이 타입을 그대로 반환하거나 `#[from] CoreError`로 래핑한다.
//! 복구 가능 여부는 [`CoreError::is_recoverable`]로 분류한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 캡처, 대상 해석, 상관 연산, 클릭 전달, 설정 등 파이프라인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 캡처 백엔드가 대상에 연결할 수 없음
    #[error("캡처 불가: {0}")]
    CaptureUnavailable(String),

    /// 프레임 획득 타임아웃
    #[error("캡처 타임아웃: {timeout_ms}ms 초과")]
    CaptureTimeout {
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 캡처 세션 유실 (창 닫힘, 크기/DPI 변경 등): 세션 재생성 필요
    #[error("캡처 세션 유실: {0}")]
    SessionLost(String),

    /// 전략 체인 전체에서 대상을 찾지 못함
    #[error("대상 미발견: {0}")]
    TargetNotFound(String),

    /// 상관 연산 타임아웃 (미스로 처리되며 외부로 노출되지 않음)
    #[error("상관 연산 타임아웃: {timeout_ms}ms 초과")]
    CorrelationTimeout {
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 상관 연산 작업 실패 (워커 패닉, 취소 등)
    #[error("상관 연산 실패: {0}")]
    CorrelationFailed(String),

    /// 합성 입력 전달 실패
    #[error("클릭 전달 실패: {0}")]
    DispatchFailed(String),

    /// 읽을 수 없거나 유효하지 않은 템플릿 (세션 시작 시 치명적)
    #[error("템플릿 오류: {path}: {reason}")]
    InvalidTemplate {
        /// 템플릿 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패: {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}

impl CoreError {
    /// 유효성 검증 에러 생성 헬퍼
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 스케줄러가 자체적으로 처리(재시도/백오프/미스)할 수 있는 에러인지 여부.
    ///
    /// 템플릿·설정 오류만 치명적이며 `start` 호출자에게 동기적으로 반환된다.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidTemplate { .. }
                | Self::Config(_)
                | Self::Validation { .. }
                | Self::Serialization(_)
        )
    }

    /// 캡처 세션을 다시 열어야 하는 에러인지 여부
    pub fn requires_reopen(&self) -> bool {
        matches!(self, Self::CaptureUnavailable(_) | Self::SessionLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_errors_are_fatal() {
        let err = CoreError::InvalidTemplate {
            path: "approve.png".to_string(),
            reason: "디코딩 실패".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("approve.png"));
    }

    #[test]
    fn capture_errors_are_recoverable() {
        assert!(CoreError::SessionLost("창 닫힘".to_string()).is_recoverable());
        assert!(CoreError::CaptureTimeout { timeout_ms: 5000 }.is_recoverable());
        assert!(CoreError::CorrelationTimeout { timeout_ms: 2000 }.is_recoverable());
        assert!(CoreError::TargetNotFound("code".to_string()).is_recoverable());
    }

    #[test]
    fn reopen_classification() {
        assert!(CoreError::SessionLost(String::new()).requires_reopen());
        assert!(CoreError::CaptureUnavailable(String::new()).requires_reopen());
        assert!(!CoreError::CaptureTimeout { timeout_ms: 1 }.requires_reopen());
        assert!(!CoreError::DispatchFailed(String::new()).requires_reopen());
    }
}
