use std::fmt;

use serde::Serialize;

use super::{Session, State};
use crate::common::Result;

/// A snapshot of every attribute of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub uid: u32,
    pub name: String,
    pub state: State,
    pub remote: bool,
    pub locked: bool,
    pub active: bool,
    pub system: bool,
    pub domain: String,
    pub display: String,
    #[serde(rename = "type")]
    pub session_type: String,
    pub service: String,
    pub class: String,
    pub seat: String,
    pub tty: String,
    pub desktop: String,
    pub path: String,
}

impl SessionInfo {
    /// Queries every attribute of the session. The first failing query aborts the snapshot.
    pub fn collect(session: &dyn Session) -> Result<SessionInfo> {
        Ok(SessionInfo {
            id: session.id().to_string(),
            uid: session.uid()?,
            name: session.name(false)?,
            state: session.state()?,
            remote: session.remote()?,
            locked: session.locked()?,
            active: session.active()?,
            system: session.system()?,
            domain: session.domain()?,
            display: session.display()?,
            session_type: session.session_type()?,
            service: session.service()?,
            class: session.classname()?,
            seat: session.seat()?,
            tty: session.tty()?,
            desktop: session.desktop()?,
            path: session.path()?,
        })
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "Session {}", self.id)?;
        writeln!(formatter, "  user:    {} ({})", self.name, self.uid)?;
        writeln!(formatter, "  state:   {}", self.state)?;
        writeln!(formatter, "  remote:  {}", self.remote)?;
        writeln!(formatter, "  locked:  {}", self.locked)?;
        writeln!(formatter, "  active:  {}", self.active)?;
        writeln!(formatter, "  system:  {}", self.system)?;
        writeln!(formatter, "  domain:  {}", self.domain)?;
        writeln!(formatter, "  display: {}", self.display)?;
        writeln!(formatter, "  type:    {}", self.session_type)?;
        writeln!(formatter, "  service: {}", self.service)?;
        writeln!(formatter, "  class:   {}", self.class)?;
        writeln!(formatter, "  seat:    {}", self.seat)?;
        writeln!(formatter, "  tty:     {}", self.tty)?;
        writeln!(formatter, "  desktop: {}", self.desktop)?;
        write!(formatter, "  path:    {}", self.path)
    }
}
