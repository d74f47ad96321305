use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

use crate::compiler::Compiler;
use crate::config::CompilerConfig;

/// C-friendly configuration struct for the compiler
#[repr(C)]
#[allow(non_camel_case_types)]
pub struct slc_config {
    /// Macro expansion limit
    pub recursion_limit: usize,
    /// Include nesting limit
    pub max_include_depth: usize,
    /// Diagnostic callback (optional, can be null); receives the formatted
    /// message and whether it is fatal
    pub diagnostic_handler: Option<extern "C" fn(*const c_char, c_int)>,
}

/// Typedef for slc_config
#[allow(non_camel_case_types)]
pub type slc_config_t = slc_config;

/// Convert C config to Rust config with validation
fn compiler_config_from_c(config: &slc_config_t) -> Result<CompilerConfig, &'static str> {
    if config.recursion_limit == 0 || config.recursion_limit > 10000 {
        return Err("Invalid recursion_limit");
    }
    if config.max_include_depth > 10000 {
        return Err("Invalid max_include_depth");
    }
    let mut rust_config = CompilerConfig::new()
        .with_recursion_limit(config.recursion_limit)
        .with_max_include_depth(config.max_include_depth);
    if let Some(handler) = config.diagnostic_handler {
        rust_config = rust_config.with_diagnostic_handler(std::rc::Rc::new(
            move |diagnostic: &crate::diagnostic::Diagnostic| {
                let message = format!("{}: {diagnostic}", diagnostic.source_name);
                let Ok(c_msg) = std::ffi::CString::new(message) else {
                    return;
                };
                handler(c_msg.as_ptr(), c_int::from(diagnostic.is_fatal()));
            },
        ));
    }
    Ok(rust_config)
}

/// Read a C string argument; null or invalid UTF-8 yields `None`
///
/// # Safety
/// `ptr` must be null or point to a valid null-terminated C string.
unsafe fn str_arg<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// Create a new compiler instance for C API
///
/// # Safety
/// This function is safe to call from C code.
/// If config is null, uses default configuration.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slc_compiler_new(config: *const slc_config_t) -> *mut Compiler {
    let compiler = if config.is_null() {
        Compiler::new()
    } else {
        let c_config = unsafe { &*config };
        match compiler_config_from_c(c_config) {
            Ok(rust_config) => Compiler::with_config(rust_config),
            Err(_) => return std::ptr::null_mut(),
        }
    };
    Box::into_raw(Box::new(compiler))
}

/// Free a compiler instance created by C API
///
/// # Safety
/// The pointer must have been created by `slc_compiler_new` and not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slc_compiler_free(compiler: *mut Compiler) {
    if !compiler.is_null() {
        unsafe {
            drop(Box::from_raw(compiler));
        }
    }
}

/// Add or replace a define; a null `definition` means `1`
///
/// Returns 1 on success, 0 on failure or invalid arguments.
///
/// # Safety
/// - `compiler` must be valid and created by `slc_compiler_new`
/// - `name` and `definition` must be null or valid null-terminated C strings
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slc_compiler_add_define(
    compiler: *mut Compiler,
    name: *const c_char,
    definition: *const c_char,
) -> c_int {
    if compiler.is_null() {
        return 0;
    }
    let Some(name) = (unsafe { str_arg(name) }) else {
        return 0;
    };
    let definition = if definition.is_null() {
        None
    } else {
        match unsafe { str_arg(definition) } {
            Some(def) => Some(def),
            None => return 0,
        }
    };
    let compiler = unsafe { &mut *compiler };
    c_int::from(compiler.add_define(name, definition).is_ok())
}

/// Remove a define if present
///
/// # Safety
/// - `compiler` must be valid and created by `slc_compiler_new`
/// - `name` must be null or a valid null-terminated C string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slc_compiler_remove_define(compiler: *mut Compiler, name: *const c_char) {
    if compiler.is_null() {
        return;
    }
    if let Some(name) = unsafe { str_arg(name) } {
        let compiler = unsafe { &mut *compiler };
        compiler.remove_define(name);
    }
}

/// Compile `len` bytes of source text
///
/// Returns the number of top-level declarations, or -1 if compilation
/// failed or the arguments are invalid.
///
/// # Safety
/// - `compiler` must be valid and created by `slc_compiler_new`
/// - `bytes` must point to at least `len` readable bytes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slc_compiler_compile_bytes(
    compiler: *const Compiler,
    bytes: *const u8,
    len: usize,
) -> isize {
    if compiler.is_null() || (bytes.is_null() && len > 0) {
        return -1;
    }
    let data: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(bytes, len) }
    };
    let compiler = unsafe { &*compiler };
    match compiler.compile_bytes(data) {
        Some(program) => isize::try_from(program.declarations().len()).unwrap_or(isize::MAX),
        None => -1,
    }
}
