use keyward_auth::{Identity, Session};

/// The revalidated session of the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session: Session,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn identity(&self) -> Identity {
        self.session.identity()
    }

    pub fn is_admin(&self) -> bool {
        self.session.role.is_admin()
    }
}
