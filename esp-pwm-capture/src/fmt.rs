#![macro_use]
#![allow(unused_macros)]

//! Log macros that forward to `defmt` or `log`, whichever is enabled.
//!
//! With neither feature enabled the macros only borrow their arguments, so
//! call sites don't trip `unused` lints.

#[collapse_debuginfo(yes)]
macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            cfg_if::cfg_if! {
                if #[cfg(feature = "defmt")] {
                    ::defmt::$level!($s $(, $x)*);
                } else if #[cfg(feature = "log-04")] {
                    ::log_04::$level!($s $(, $x)*);
                } else {
                    let _ = ($( & $x ),*);
                }
            }
        }
    };
}

#[collapse_debuginfo(yes)]
macro_rules! trace {
    ($($arg:tt)*) => {
        log_at!(trace, $($arg)*)
    };
}

#[collapse_debuginfo(yes)]
macro_rules! debug {
    ($($arg:tt)*) => {
        log_at!(debug, $($arg)*)
    };
}

#[collapse_debuginfo(yes)]
macro_rules! info {
    ($($arg:tt)*) => {
        log_at!(info, $($arg)*)
    };
}

#[collapse_debuginfo(yes)]
macro_rules! warn {
    ($($arg:tt)*) => {
        log_at!(warn, $($arg)*)
    };
}

#[collapse_debuginfo(yes)]
macro_rules! error {
    ($($arg:tt)*) => {
        log_at!(error, $($arg)*)
    };
}

cfg_if::cfg_if! {
    if #[cfg(feature = "defmt")] {
        pub(crate) use defmt::Debug2Format;
    } else {
        use core::fmt::{Debug, Formatter, Result};

        /// Formats a `Debug`-only value (such as a controller error) in a log
        /// line.
        pub(crate) struct Debug2Format<'a, T: Debug + ?Sized>(pub &'a T);

        impl<T: Debug + ?Sized> Debug for Debug2Format<'_, T> {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                self.0.fmt(f)
            }
        }
    }
}
