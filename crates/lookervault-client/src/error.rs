use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limited")]
    RateLimited,

    #[error("looker API error: status={status} permanent={permanent} body={body}")]
    Api {
        status: u16,
        permanent: bool,
        body: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClientError {
    /// 4xx (other than 429) are permanent: retrying never helps.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ClientError::Api { permanent: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(400, true)]
    #[case(404, true)]
    #[case(422, true)]
    #[case(500, false)]
    #[case(503, false)]
    fn api_error_permanence_follows_status_class(#[case] status: u16, #[case] permanent: bool) {
        let err = ClientError::Api { status, permanent, body: String::new() };
        assert_eq!(err.is_permanent(), permanent);
    }

    #[test]
    fn rate_limited_is_never_permanent() {
        assert!(!ClientError::RateLimited.is_permanent());
    }
}
