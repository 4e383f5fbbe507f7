//! Real-time scheduling elevation for the consumer thread (§5 "Priority
//! policy", §9 "Thread priority"): "the consumer thread should run at
//! real-time priority when possible ... falling back with a warning if the
//! process lacks the necessary capability. Never assume RT is available."
//!
//! Grounded directly on the teacher family's `transmitter_loop`
//! (`bass-srt/src/output/stream.rs`): `libc::nice(-20)` on Linux,
//! `SetThreadPriority(..., THREAD_PRIORITY_TIME_CRITICAL)` on Windows, called
//! once at the top of the realtime thread rather than wrapped in any retry —
//! a denied priority request is not worth retrying, only reporting.

/// Attempts to elevate the calling thread to the platform's realtime-ish
/// priority class. Returns `Ok(())` on success, `Err(reason)` if the OS
/// denied the request or this platform has no such primitive — never panics,
/// since a denial is an expected, non-fatal outcome (`CoreError::PriorityDenied`
/// is how a caller that wants a typed error can wrap this).
#[cfg(unix)]
pub fn elevate_current_thread() -> Result<(), String> {
    unsafe {
        let errno_loc = libc::__errno_location();
        *errno_loc = 0;
        let result = libc::nice(-20);
        if result == -1 && *errno_loc != 0 {
            Err(format!("libc::nice(-20) failed (errno {})", *errno_loc))
        } else {
            Ok(())
        }
    }
}

#[cfg(windows)]
pub fn elevate_current_thread() -> Result<(), String> {
    use windows_sys::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL,
    };
    let ok = unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_TIME_CRITICAL) };
    if ok == 0 {
        Err("SetThreadPriority(THREAD_PRIORITY_TIME_CRITICAL) failed".to_string())
    } else {
        Ok(())
    }
}

#[cfg(not(any(unix, windows)))]
pub fn elevate_current_thread() -> Result<(), String> {
    Err("realtime thread priority elevation is not implemented on this platform".to_string())
}
