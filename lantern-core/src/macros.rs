#[macro_export]
#[doc(hidden)]
macro_rules! lantern_debug {
    ($($arg:tt)*) => {
        $crate::Registry::with(|registry| {
            if registry.agent().map_or(false, |agent| agent.options().debug) {
                $crate::__debug_log(format_args!($($arg)*));
            }
        });
    }
}

#[doc(hidden)]
pub fn __debug_log(args: std::fmt::Arguments<'_>) {
    #[cfg(feature = "debug-logs")]
    {
        log::debug!(target: "lantern", "{}", args);
    }
    #[cfg(not(feature = "debug-logs"))]
    {
        eprintln!("[lantern] {}", args);
    }
}
