use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Session state, as reported by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Logged in but not active, i.e. not in the foreground.
    Background,
    /// Logged in and active, i.e. in the foreground.
    Foreground,
    Opening,
    /// Nominally logged out, but some processes belonging to the session are still around.
    Closing,
    Unknown,
}

impl State {
    /// Maps a session manager state token to a `State`. Unrecognised tokens give `State::Unknown`.
    pub fn from_token(token: &str) -> State {
        match token {
            "online" => State::Background,
            "active" => State::Foreground,
            "opening" => State::Opening,
            "closing" => State::Closing,
            _ => State::Unknown,
        }
    }

    /// Returns the session manager token for this state.
    pub fn token(&self) -> &'static str {
        match self {
            State::Background => "online",
            State::Foreground => "active",
            State::Opening => "opening",
            State::Closing => "closing",
            State::Unknown => "unknown",
        }
    }
}

impl FromStr for State {
    type Err = std::convert::Infallible;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Ok(State::from_token(token))
    }
}

impl Default for State {
    fn default() -> Self {
        State::Unknown
    }
}

impl fmt::Display for State {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens_map_to_states() {
        assert_eq!(State::from_token("online"), State::Background);
        assert_eq!(State::from_token("active"), State::Foreground);
        assert_eq!(State::from_token("opening"), State::Opening);
        assert_eq!(State::from_token("closing"), State::Closing);
    }

    #[test]
    fn unknown_tokens_map_to_unknown() {
        for token in ["", "ACTIVE", "online ", "lingering", "unknown", "\0", "activeX"] {
            assert_eq!(State::from_token(token), State::Unknown, "token {:?}", token);
        }
    }

    #[test]
    fn token_and_display_agree() {
        for state in [State::Background, State::Foreground, State::Opening, State::Closing] {
            assert_eq!(State::from_token(state.token()), state);
            assert_eq!(state.to_string(), state.token());
        }
        assert_eq!("closing".parse::<State>().unwrap(), State::Closing);
    }
}
