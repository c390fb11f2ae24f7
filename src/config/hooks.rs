// ABOUTME: Lifecycle hook execution configuration.
// ABOUTME: Selects the interpreter used to run deployment/<hook> scripts.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HookSettings {
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for HookSettings {
    fn default() -> Self {
        HookSettings {
            shell: default_shell(),
        }
    }
}
