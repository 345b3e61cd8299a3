use crate::db::models::UserProfile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Login,
    ProfileSetup,
    Dashboard,
    Generator,
    Settings,
    Tutorial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: View,
    pub to: View,
    /// Leaving the generator: the in-progress carousel goes to history first.
    pub flush_session: bool,
}

impl Transition {
    fn new(from: View, to: View) -> Self {
        Self {
            from,
            to,
            flush_session: from == View::Generator && to != View::Generator,
        }
    }
}

/// Screen state driven by authentication events and navigation calls.
#[derive(Debug, Default)]
pub struct Router {
    view: View,
}

impl Router {
    pub fn view(&self) -> View {
        self.view
    }

    fn go(&mut self, to: View) -> Transition {
        let transition = Transition::new(self.view, to);
        if transition.from != transition.to {
            tracing::debug!(from = ?transition.from, to = ?transition.to, "View change");
        }
        self.view = to;
        transition
    }

    pub fn on_signed_in(&mut self, profile: &UserProfile) -> Transition {
        if profile.is_complete {
            self.go(View::Dashboard)
        } else {
            self.go(View::ProfileSetup)
        }
    }

    pub fn on_signed_out(&mut self) -> Transition {
        self.go(View::Login)
    }

    pub fn on_profile_completed(&mut self) -> Transition {
        self.go(View::Dashboard)
    }

    /// User navigation. Refused while signed out or while profile setup is
    /// pending; LOGIN and PROFILE_SETUP are only reachable through events.
    pub fn navigate(&mut self, to: View) -> Option<Transition> {
        match (self.view, to) {
            (View::Login | View::ProfileSetup, _) => None,
            (_, View::Login | View::ProfileSetup) => None,
            _ => Some(self.go(to)),
        }
    }
}
