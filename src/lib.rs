//! macOS app bundle dependency copying and relinking.
//!
//! Uses `otool` to read dylib references and `LC_RPATH` entries and
//! `install_name_tool` to rewrite them, so libraries installed under a
//! package-manager prefix can be shipped inside `Contents/Frameworks` and
//! loaded via `@rpath` without the prefix present at runtime.

mod analyze;
mod bundle;
mod closure;
mod copy;
mod graph;
mod paths;
mod prefix;
mod relink;
mod sign;
mod tools;

pub use analyze::{
    get_install_id, get_library_dependencies, get_rpaths, parse_otool_install_id,
    parse_otool_libraries, parse_otool_rpaths,
};
pub use bundle::{insert_plist_string, AppBundle, CAMERA_USAGE_KEY};
pub use closure::{
    bundle_dependencies, verify_bundle, BundledLibrary, ClosureReport, DependencyEdge,
    ResolverConfig, UnresolvedReference,
};
pub use copy::{copy_real_file, make_executable};
pub use graph::{render_dot, write_dot};
pub use paths::{
    expand_placeholders, find_in_rpaths, is_external, relative_rpath, resolve_reference,
    rpath_reference, DependencyRef, ResolveContext, EXECUTABLE_PATH, LOADER_PATH, RPATH_TOKEN,
};
pub use prefix::detect_brew_prefix;
pub use relink::{add_rpath, change_dependency, set_install_id};
pub use sign::{sign_bundle, sign_path, AD_HOC};
pub use tools::{MachOTools, SystemTools};
