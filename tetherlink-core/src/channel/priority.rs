// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority of a connection request. Passed through to the connection
/// medium, which serves higher priorities first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPriority {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for ConnectionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPriority::Low => "low",
            ConnectionPriority::Medium => "medium",
            ConnectionPriority::High => "high",
        };
        f.write_str(name)
    }
}
