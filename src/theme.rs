use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// The active theme, observable by anything that renders.
pub struct ThemeState {
    tx: watch::Sender<Theme>,
}

impl Default for ThemeState {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

impl ThemeState {
    pub fn new(theme: Theme) -> Self {
        Self { tx: watch::channel(theme).0 }
    }

    pub fn get(&self) -> Theme {
        *self.tx.borrow()
    }

    pub fn set(&self, theme: Theme) {
        self.tx.send_if_modified(|current| {
            let changed = *current != theme;
            *current = theme;
            changed
        });
    }

    pub fn toggle(&self) -> Theme {
        self.tx.send_modify(|current| *current = current.toggled());
        self.get()
    }

    pub fn watch(&self) -> watch::Receiver<Theme> {
        self.tx.subscribe()
    }
}
