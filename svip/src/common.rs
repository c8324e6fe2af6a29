use parking_lot::RwLock;
use std::sync::Arc;

/// Shared, lock-protected value.
pub type Atomic<T> = Arc<RwLock<T>>;

/// Wraps `t` into an [`Atomic`].
#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

/// Returns the type name without module path, keeping generic arguments short too.
///
/// `svip::backend::memory::MemoryBackend<u32, alloc::string::String>` becomes
/// `MemoryBackend<u32, String>`.
pub fn short_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();
    for ch in full_name.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                result.push_str(last_path_segment(&segment));
                segment.clear();
                result.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    result.push_str(last_path_segment(&segment));
    result
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}
