/*
 * Nox Fluence Peer
 *
 * Copyright (C) 2024 Fluence DAO
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation version 3 of the
 * License.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use tracing::metadata::Level;
use tracing_subscriber::filter::Directive;

fn default_directives() -> Vec<Directive> {
    let namespaces = vec!["cpu-assignment=debug", "cpu-topology=debug"];

    namespaces
        .into_iter()
        .filter_map(|ns| ns.trim().parse().ok())
        .collect()
}

// Enables logging, filtering out unnecessary details
pub fn enable_logs() {
    enable_logs_for(LogSpec::default())
}

pub struct LogSpec {
    level: Level,
    directives: Vec<Directive>,
}

impl Default for LogSpec {
    fn default() -> Self {
        Self::new(vec![]).with_defaults().with_level(Level::INFO)
    }
}

impl LogSpec {
    pub fn new(directives: Vec<Directive>) -> Self {
        Self {
            level: Level::INFO,
            directives,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;

        self
    }

    pub fn with_defaults(mut self) -> Self {
        self.directives = default_directives()
            .into_iter()
            .chain(self.directives)
            .collect();

        self
    }

    pub fn with_directives(mut self, directives: Vec<Directive>) -> Self {
        self.directives = self.directives.into_iter().chain(directives).collect();

        self
    }
}

/// Installs a global fmt subscriber. Later calls are no-ops, so every test may call it.
pub fn enable_logs_for(spec: LogSpec) {
    let mut filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(spec.level.into())
        .from_env_lossy();

    for d in spec.directives {
        filter = filter.add_directive(d);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::Directive;

    use super::{default_directives, LogSpec};

    #[test]
    fn test_default_directives_parse() {
        assert_eq!(default_directives().len(), 2);
    }

    #[test]
    fn test_directives_are_appended() {
        let spec = LogSpec::default().with_directives(vec!["sysfs=trace".parse().unwrap()]);
        assert_eq!(spec.directives.len(), 3);
        let expected: Directive = "sysfs=trace".parse().unwrap();
        assert_eq!(spec.directives[2].to_string(), expected.to_string());
    }
}
