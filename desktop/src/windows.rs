use {
    anyhow::bail,
    tracing::debug,
    windows_sys::Win32::{
        Foundation::{GetLastError, ERROR_ACCESS_DENIED},
        UI::HiDpi::{SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2},
    },
};

/// Makes capture pixels and cursor coordinates use the same physical
/// coordinate space on scaled displays.
pub fn prepare_process() -> anyhow::Result<()> {
    let ret = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
    if ret == 0 {
        let error = unsafe { GetLastError() };
        // Already set (e.g. by the manifest).
        if error == ERROR_ACCESS_DENIED {
            debug!("DPI awareness was already configured");
            return Ok(());
        }
        bail!("failed to set DPI awareness (error code: {})", error);
    }
    Ok(())
}
