//! Scoped environment overrides for `#[serial]` tests.

/// Records the previous value of every variable it touches and restores
/// them in reverse order on drop.
#[derive(Default)]
pub(crate) struct ScopedEnv {
    saved: Vec<(&'static str, Option<String>)>,
}

impl ScopedEnv {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(mut self, key: &'static str, value: &str) -> Self {
        self.saved.push((key, std::env::var(key).ok()));
        // Callers hold the `serial_test` lock, so no other test thread reads env.
        unsafe {
            std::env::set_var(key, value);
        }
        self
    }

    pub(crate) fn unset(mut self, key: &'static str) -> Self {
        self.saved.push((key, std::env::var(key).ok()));
        unsafe {
            std::env::remove_var(key);
        }
        self
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}
