//! Erros de entrega do callback de conclusão.
//!
//! Define [`NotifyError`] com variantes para resposta não-2xx, timeout e
//! falhas de rede. Qualquer variante conta como uma tentativa falha.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// O destino respondeu com um status fora da faixa 2xx.
    #[error("callback rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// O destino não respondeu dentro do timeout configurado.
    #[error("callback timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Falha de rede subjacente (DNS, conexão recusada, TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display() {
        let err = NotifyError::Rejected {
            status: 503,
            body: "try later".into(),
        };
        assert_eq!(err.to_string(), "callback rejected (status 503): try later");
    }

    #[test]
    fn timeout_display() {
        let err = NotifyError::Timeout { timeout_ms: 1000 };
        assert_eq!(err.to_string(), "callback timed out after 1000ms");
    }
}
