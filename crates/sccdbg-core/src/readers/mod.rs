//! # Structure Readers
//!
//! Typed readers that turn target structures into local snapshots.
//!
//! Each reader fetches a fixed-layout header through the [`Session`],
//! validates it, and returns a plain struct. Pointer fields come back as
//! [`TargetAddr`]s for the caller to follow (or not); names are decoded
//! eagerly. Readers share the session's shadow cache, so two readers
//! reaching the same address within a command see the same bytes.
//!
//! [`Session`]: crate::target::Session
//! [`TargetAddr`]: crate::types::TargetAddr

pub mod jit;
pub mod layouts;
pub mod ram;
pub mod rom;
pub mod shared_cache;
pub mod utf8;
pub mod vm;

pub use jit::{find_jit_metadata, read_jit_metadata, JitMetadata};
pub use layouts::VmLayouts;
pub use ram::{
    class_name_from_object, read_class, read_constant_pool, read_method, read_object, ConstantPool, JavaObject,
    RamClass, RamMethod,
};
pub use rom::{
    class_name_from_rom_class, read_name_from_rom_method, read_rom_class, read_rom_method, rom_methods, RomClass,
    RomMethod,
};
pub use shared_cache::{load_cache_layers, read_shared_cache_metadata, select_layer, CacheLayer, CacheLocation};
pub use utf8::{read_utf8, read_utf8_srp};
pub use vm::{
    find_java_vm, read_cache_descriptors, read_cache_header, read_java_vm, read_shared_class_config, CacheDescriptor,
    JavaVm, SharedClassConfig,
};
