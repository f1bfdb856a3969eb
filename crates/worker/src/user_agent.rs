// Browser and OS names from a User-Agent header

use woothee::parser::Parser;

const UNKNOWN: &str = "UNKNOWN";

/// Browser and operating system parsed from a User-Agent string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientProfile {
    pub browser: Option<String>,
    pub os: Option<String>,
}

impl ClientProfile {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let Some(result) = Parser::new().parse(user_agent) else {
            return Self::default();
        };
        Self {
            browser: known(&result.name),
            os: known(&result.os),
        }
    }
}

fn known(value: &str) -> Option<String> {
    (!value.is_empty() && value != UNKNOWN).then(|| value.to_string())
}
