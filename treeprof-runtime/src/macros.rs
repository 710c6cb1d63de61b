//! Instrumentation macros.
//!
//! Each macro takes an `Option<&mut Profiler<_>>`; `None` makes the call a
//! no-op, so a library can be instrumented unconditionally and profiled only
//! when the caller hands it a profiler. With the `disabled` feature every
//! macro expands to nothing and its arguments are not evaluated.
//!
//! ```
//! use treeprof_runtime::{Profiler, prof_start, prof_stop};
//!
//! let mut prof = Profiler::local("solver");
//! prof_start!(Some(&mut prof), "assemble");
//! prof_stop!(Some(&mut prof), "assemble");
//! ```

#[doc(hidden)]
#[macro_export]
macro_rules! __treeprof_name {
    ($name:expr) => {
        ::core::convert::AsRef::<str>::as_ref(&$name)
    };
}

#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_init {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            prof.init($crate::__treeprof_name!($name));
        }
    }};
}

#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_leave {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            prof.leave($crate::__treeprof_name!($name));
        }
    }};
}

#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_init_leave {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            prof.init_leave($crate::__treeprof_name!($name));
        }
    }};
}

/// Enter and start the region `name`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_start {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            prof.enter($crate::__treeprof_name!($name));
        }
    }};
}

/// Stop and leave the region `name`. The clock is read first.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_stop {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            let wtime = prof.wtime();
            let name = &$name;
            let name: &str = ::core::convert::AsRef::<str>::as_ref(name);
            prof.stop(name, wtime);
            prof.leave(name);
        }
    }};
}

#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_start_repeat {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            prof.start_repeat($crate::__treeprof_name!($name));
        }
    }};
}

#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_stop_repeat {
    ($prof:expr, $name:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            let wtime = prof.wtime();
            prof.stop($crate::__treeprof_name!($name), wtime);
        }
    }};
}

#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! prof_disp {
    ($prof:expr) => {{
        if let ::core::option::Option::Some(prof) = $prof {
            prof.disp();
        }
    }};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_init {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_leave {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_init_leave {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_start {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_stop {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_start_repeat {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_stop_repeat {
    ($prof:expr, $name:expr) => {{}};
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! prof_disp {
    ($prof:expr) => {{}};
}
