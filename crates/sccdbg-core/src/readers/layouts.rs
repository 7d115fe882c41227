//! Layouts of the VM structures the readers decode.
//!
//! Only the leading fields each reader needs are described; fields after
//! the last one listed are never read.

use crate::codec::cache_header_layout;
use crate::layout::{Abi, FieldKind, StructLayout};

/// `J9RAS.eyecatcher`
pub const RAS_EYECATCHER: &[u8; 8] = b"J9VMRAS\0";

/// `J9JavaVM.reserved1_identifier` ("J9VM")
pub const VM_IDENTIFIER: u64 = 0x4A39_564D;

/// `J9Class.eyecatcher`
pub const CLASS_EYECATCHER: u64 = 0x9966_9966;

/// Flag bits kept in the low bits of `J9Method.constantPool`
pub const METHOD_CP_FLAGS_MASK: u64 = 0x7;

/// Flag bits kept in the low bits of an object's class pointer
pub const OBJECT_CLASS_FLAGS_MASK: u64 = 0xff;

/// Layouts of every structure the readers decode, for one ABI
#[derive(Debug, Clone)]
pub struct VmLayouts
{
    pub ras: StructLayout,
    pub java_vm: StructLayout,
    pub shared_class_config: StructLayout,
    pub cache_descriptor: StructLayout,
    pub cache_header: StructLayout,
    pub rom_class: StructLayout,
    pub rom_method: StructLayout,
    pub class: StructLayout,
    pub method: StructLayout,
    pub constant_pool: StructLayout,
    pub object: StructLayout,
    pub jit_config: StructLayout,
    pub avl_tree: StructLayout,
    pub jit_range_node: StructLayout,
    pub jit_metadata: StructLayout,
}

impl VmLayouts
{
    pub fn new(abi: Abi) -> Self
    {
        use FieldKind::{Bytes, Pointer, Srp, Udata, Wsrp, I16, I32, U16, U32, U64, U8};

        Self {
            ras: StructLayout::build(
                "J9RAS",
                &abi,
                &[
                    ("eyecatcher", Bytes(8)),
                    ("bitpattern1", U32),
                    ("bitpattern2", U32),
                    ("version", I32),
                    ("length", I32),
                    ("ddrData", Pointer),
                    ("mainThreadOffset", Udata),
                    ("omrthreadNextOffset", Udata),
                    ("osthreadOffset", Udata),
                    ("idOffset", Udata),
                    ("typedefsLen", Udata),
                    ("typedefs", Pointer),
                    ("env", Pointer),
                    ("vm", Pointer),
                ],
            ),
            java_vm: StructLayout::build(
                "J9JavaVM",
                &abi,
                &[
                    ("reserved1_identifier", Udata),
                    ("internalVMFunctions", Pointer),
                    ("portLibrary", Pointer),
                    ("mainThread", Pointer),
                    ("classMemorySegments", Pointer),
                    ("classLoaderBlocks", Pointer),
                    ("systemClassLoader", Pointer),
                    ("applicationClassLoader", Pointer),
                    ("sharedClassConfig", Pointer),
                    ("jitConfig", Pointer),
                    ("runtimeFlags", Udata),
                    ("totalThreadCount", Udata),
                ],
            ),
            shared_class_config: StructLayout::build(
                "J9SharedClassConfig",
                &abi,
                &[
                    ("sharedClassCache", Pointer),
                    ("cacheDescriptorList", Pointer),
                    ("runtimeFlags", U64),
                    ("verboseFlags", Udata),
                    ("softMaxBytes", Udata),
                ],
            ),
            cache_descriptor: StructLayout::build(
                "J9SharedClassCacheDescriptor",
                &abi,
                &[
                    ("cacheStartAddress", Pointer),
                    ("romclassStartAddress", Pointer),
                    ("metadataStartAddress", Pointer),
                    ("cacheSizeBytes", Udata),
                    ("next", Pointer),
                ],
            ),
            cache_header: cache_header_layout(&abi),
            rom_class: StructLayout::build(
                "J9ROMClass",
                &abi,
                &[
                    ("romSize", U32),
                    ("singleScalarStaticCount", U32),
                    ("className", Srp),
                    ("superclassName", Srp),
                    ("modifiers", U32),
                    ("extraModifiers", U32),
                    ("interfaceCount", U32),
                    ("interfaces", Srp),
                    ("romMethodCount", U32),
                    ("romMethods", Srp),
                    ("romFieldCount", U32),
                    ("romFields", Srp),
                    ("objectStaticCount", U32),
                    ("doubleScalarStaticCount", U32),
                    ("ramConstantPoolCount", U32),
                    ("romConstantPoolCount", U32),
                ],
            ),
            rom_method: StructLayout::build(
                "J9ROMMethod",
                &abi,
                &[
                    ("nameAndSignature.name", Srp),
                    ("nameAndSignature.signature", Srp),
                    ("modifiers", U32),
                    ("maxStack", U16),
                    ("bytecodeSizeLow", U16),
                    ("bytecodeSizeHigh", U8),
                    ("argCount", U8),
                    ("tempCount", U16),
                ],
            ),
            class: StructLayout::build(
                "J9Class",
                &abi,
                &[
                    ("eyecatcher", Udata),
                    ("romClass", Pointer),
                    ("superclasses", Pointer),
                    ("classDepthAndFlags", Udata),
                    ("classDepthWithFlags", U32),
                    ("classFlags", U32),
                    ("classLoader", Pointer),
                    ("classObject", Pointer),
                    ("initializeStatus", Udata),
                    ("ramMethods", Pointer),
                    ("ramStatics", Pointer),
                    ("arrayClass", Pointer),
                    ("totalInstanceSize", Udata),
                    ("instanceDescription", Pointer),
                    ("ramConstantPool", Pointer),
                ],
            ),
            method: StructLayout::build(
                "J9Method",
                &abi,
                &[
                    ("bytecodes", Pointer),
                    ("constantPool", Pointer),
                    ("methodRunAddress", Pointer),
                    ("extra", Pointer),
                ],
            ),
            constant_pool: StructLayout::build(
                "J9ConstantPool",
                &abi,
                &[("ramClass", Pointer), ("romConstantPool", Pointer)],
            ),
            object: StructLayout::build("J9Object", &abi, &[("clazz", Pointer)]),
            jit_config: StructLayout::build(
                "J9JITConfig",
                &abi,
                &[
                    ("translationArtifacts", Pointer),
                    ("codeCacheList", Pointer),
                    ("dataCacheList", Pointer),
                ],
            ),
            avl_tree: StructLayout::build(
                "J9AVLTree",
                &abi,
                &[
                    ("insertionComparator", Pointer),
                    ("searchComparator", Pointer),
                    ("genericActionHook", Pointer),
                    ("performNodeAction", Pointer),
                    ("flags", Udata),
                    ("rootNode", Pointer),
                    ("portLibrary", Pointer),
                ],
            ),
            jit_range_node: StructLayout::build(
                "J9JITHashTable",
                &abi,
                &[
                    ("leftChild", Wsrp),
                    ("rightChild", Wsrp),
                    ("start", Udata),
                    ("end", Udata),
                    ("flags", Udata),
                    ("methodList", Pointer),
                ],
            ),
            jit_metadata: StructLayout::build(
                "J9JITExceptionTable",
                &abi,
                &[
                    ("className", Pointer),
                    ("methodName", Pointer),
                    ("methodSignature", Pointer),
                    ("constantPool", Pointer),
                    ("ramMethod", Pointer),
                    ("startPC", Udata),
                    ("endWarmPC", Udata),
                    ("startColdPC", Udata),
                    ("endPC", Udata),
                    ("totalFrameSize", Udata),
                    ("slots", I16),
                    ("scalarTempSlots", I16),
                    ("objectTempSlots", I16),
                    ("prologuePushes", U16),
                    ("tempOffset", I16),
                    ("numExcptionRanges", U16),
                    ("size", I32),
                    ("flags", U32),
                    ("registerSaveDescription", Udata),
                    ("gcStackAtlas", Pointer),
                    ("inlinedCalls", Pointer),
                    ("bodyInfo", Pointer),
                    ("nextMethod", Pointer),
                    ("prevMethod", Pointer),
                ],
            ),
        }
    }
}
