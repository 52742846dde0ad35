pub mod chat {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        System,
        Assistant,
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Message {
        pub role: Role,
        pub content: String,
    }

    impl Message {
        pub fn user(content: impl Into<String>) -> Self {
            Self { role: Role::User, content: content.into() }
        }

        pub fn system(content: impl Into<String>) -> Self {
            Self { role: Role::System, content: content.into() }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self { role: Role::Assistant, content: content.into() }
        }
    }

    /// Model slug sent on the wire. The named variants are the two slugs we
    /// ship constants for; anything else rides in `Custom`.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Model {
        Gpt35Turbo,
        Gpt4,
        Custom(String),
    }

    impl Model {
        pub fn as_str(&self) -> &str {
            match self {
                Model::Gpt35Turbo => "gpt-3.5-turbo",
                Model::Gpt4 => "gpt-4",
                Model::Custom(s) => s,
            }
        }
    }

    impl From<String> for Model {
        fn from(s: String) -> Self {
            match s.as_str() {
                "gpt-3.5-turbo" => Model::Gpt35Turbo,
                "gpt-4" => Model::Gpt4,
                _ => Model::Custom(s),
            }
        }
    }

    impl From<&str> for Model {
        fn from(s: &str) -> Self {
            Model::from(s.to_string())
        }
    }

    impl fmt::Display for Model {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl Serialize for Model {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(self.as_str())
        }
    }

    impl<'de> Deserialize<'de> for Model {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            Ok(String::deserialize(deserializer)?.into())
        }
    }

    #[derive(Error, Debug)]
    pub enum ChatError {
        #[error("auth error: {0}")] Auth(String),
        #[error("rate limit: {0}")] RateLimit(String),
        #[error("timeout: {0}")] Timeout(String),
        #[error("network: {0}")] Network(String),
        #[error("encode request: {0}")] Encode(String),
        #[error("decode: {0}")] Decode(String),
        #[error("empty response")] EmptyResponse,
        #[error("protocol: {0}")] Protocol(String),
        #[error("canceled")] Canceled,
        #[error("other: {0}")] Other(String),
    }
}

pub mod secret {
    use secrecy::{ExposeSecret, SecretString};
    use std::fmt;

    /// API token wrapper. Debug output is redacted and there is no Display or
    /// serde path; `reveal` is the only way at the raw value.
    #[derive(Clone)]
    pub struct ApiKey(SecretString);

    impl ApiKey {
        pub fn new(raw: impl Into<String>) -> Self {
            Self(SecretString::from(raw.into()))
        }

        /// Raw token, for the Authorization header.
        pub fn reveal(&self) -> &str {
            self.0.expose_secret()
        }
    }

    impl From<String> for ApiKey {
        fn from(raw: String) -> Self {
            Self::new(raw)
        }
    }

    impl From<&str> for ApiKey {
        fn from(raw: &str) -> Self {
            Self::new(raw)
        }
    }

    impl fmt::Debug for ApiKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("ApiKey([REDACTED])")
        }
    }
}
