//! Synthetic targets shared by the integration tests.
//!
//! Everything here builds plain byte buffers laid out the way a 64-bit
//! little-endian VM would, then maps them into a [`MemoryImage`].

#![allow(dead_code)]

pub mod writer;

use sccdbg_core::codec::RecordLayouts;
use sccdbg_core::config::TargetConfig;
use sccdbg_core::layout::{FieldKind, StructLayout};
use sccdbg_core::readers::layouts::{CLASS_EYECATCHER, RAS_EYECATCHER, VM_IDENTIFIER};
use sccdbg_core::readers::VmLayouts;
use sccdbg_core::target::MemoryImage;
use sccdbg_core::types::{TargetAddr, TargetArch};
use self::writer::MetadataWriter;

pub const CACHE_BASE: u64 = 0x7f00_0000_0000;
pub const CACHE_SIZE: u32 = 64 * 1024;
pub const READ_WRITE_BYTES: u32 = 4096;
pub const HEAP_BASE: u64 = 0x1000_0000;
pub const RAS_BITPATTERN: u64 = 0xaa55_aa55;

/// Code ranges registered in the JIT tree of [`World`]
pub const JIT_LOW: (u64, u64) = (0x5000_0000, 0x5000_1000);
pub const JIT_HIGH: (u64, u64) = (0x6000_0000, 0x6000_1000);

pub fn addr(value: u64) -> TargetAddr
{
    TargetAddr::from(value)
}

pub fn writer(config: &TargetConfig) -> MetadataWriter
{
    MetadataWriter::new(
        RecordLayouts::new(config.abi()),
        config.alignment,
        addr(CACHE_BASE),
        CACHE_SIZE,
        READ_WRITE_BYTES,
    )
    .unwrap()
}

/// Map a finished cache layer at `base`
pub fn cache_image(base: u64, bytes: Vec<u8>) -> MemoryImage
{
    let mut image = MemoryImage::new("test cache");
    image.add_region(addr(base), bytes, Some("cache".into())).unwrap();
    image
}

/// Encode integer fields of `layout`; unnamed fields stay zero
pub fn encode(layout: &StructLayout, arch: &TargetArch, values: &[(&str, u64)]) -> Vec<u8>
{
    let mut out = vec![0u8; layout.size()];
    for (name, value) in values {
        let field = layout.field(name).unwrap();
        let slot = &mut out[field.offset..];
        match field.kind {
            FieldKind::U8 => slot[0] = *value as u8,
            FieldKind::U16 | FieldKind::I16 => arch.put_u16(slot, *value as u16),
            FieldKind::U32 | FieldKind::I32 | FieldKind::Srp | FieldKind::ShrOffset => arch.put_u32(slot, *value as u32),
            FieldKind::U64 | FieldKind::I64 => arch.put_u64(slot, *value),
            FieldKind::Udata | FieldKind::Pointer | FieldKind::Wsrp => arch.put_udata(slot, *value),
            FieldKind::Bytes(_) => panic!("{name}: byte arrays are copied by hand"),
        }
    }
    out
}

/// A `J9UTF8`: `u16` length then the bytes
pub fn utf8(text: &str) -> Vec<u8>
{
    let mut out = (text.len() as u16).to_le_bytes().to_vec();
    out.extend_from_slice(text.as_bytes());
    out
}

/// Bump allocator for VM structures outside the cache
pub struct Heap
{
    base: u64,
    bytes: Vec<u8>,
}

impl Heap
{
    pub fn new(base: u64) -> Self
    {
        Self { base, bytes: Vec::new() }
    }

    /// Reserve `len` zeroed bytes at the next 8-byte boundary
    pub fn reserve(&mut self, len: usize) -> TargetAddr
    {
        let start = self.bytes.len().div_ceil(8) * 8;
        self.bytes.resize(start + len, 0);
        addr(self.base + start as u64)
    }

    pub fn alloc(&mut self, bytes: &[u8]) -> TargetAddr
    {
        let at = self.reserve(bytes.len());
        self.patch(at, bytes);
        at
    }

    pub fn patch(&mut self, at: TargetAddr, bytes: &[u8])
    {
        let start = (at.value() - self.base) as usize;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn map_into(self, image: &mut MemoryImage)
    {
        image.add_region(addr(self.base), self.bytes, Some("heap".into())).unwrap();
    }
}

/// A ROM method to lay out: name, signature, bytecodes
pub type MethodSpec<'a> = (&'a str, &'a str, &'a [u8]);

/// Lay out a ROM class with its methods and strings in the ROM segment
///
/// Returns the ROM class address and the address of each ROM method.
pub fn write_rom_class(
    writer: &mut MetadataWriter,
    layouts: &VmLayouts,
    name: &str,
    methods: &[MethodSpec<'_>],
) -> (TargetAddr, Vec<TargetAddr>)
{
    let arch = TargetArch::default();
    let header = layouts.rom_class.size();
    let method_header = layouts.rom_method.size();

    let mut method_offsets = Vec::new();
    let mut cursor = header;
    for (_, _, bytecodes) in methods {
        method_offsets.push(cursor);
        cursor += method_header + bytecodes.len().div_ceil(4) * 4;
    }

    let mut strings = Vec::new();
    let place = |text: &str, strings: &mut Vec<u8>| -> usize {
        if strings.len() % 2 == 1 {
            strings.push(0);
        }
        let at = cursor + strings.len();
        strings.extend_from_slice(&utf8(text));
        at
    };
    let class_name = place(name, &mut strings);
    let method_names: Vec<(usize, usize)> = methods
        .iter()
        .map(|(method, signature, _)| (place(*method, &mut strings), place(*signature, &mut strings)))
        .collect();
    let rom_size = (cursor + strings.len()).div_ceil(4) * 4;

    let srp = |field: usize, target: usize| (target as i64 - field as i64) as u64;
    let rc = &layouts.rom_class;
    let mut values = vec![
        ("romSize", rom_size as u64),
        ("className", srp(rc.offset("className").unwrap(), class_name)),
        ("modifiers", 0x21),
        ("romMethodCount", methods.len() as u64),
    ];
    if !methods.is_empty() {
        values.push(("romMethods", srp(rc.offset("romMethods").unwrap(), header)));
    }
    let mut blob = encode(rc, &arch, &values);
    blob.resize(rom_size, 0);

    let rm = &layouts.rom_method;
    for ((offset, (_, _, bytecodes)), (name_at, sig_at)) in method_offsets.iter().zip(methods).zip(&method_names) {
        let size = bytecodes.len() as u64;
        let encoded = encode(
            rm,
            &arch,
            &[
                ("nameAndSignature.name", srp(offset + rm.offset("nameAndSignature.name").unwrap(), *name_at)),
                (
                    "nameAndSignature.signature",
                    srp(offset + rm.offset("nameAndSignature.signature").unwrap(), *sig_at),
                ),
                ("modifiers", 0x1),
                ("maxStack", 2),
                ("bytecodeSizeLow", size & 0xffff),
                ("bytecodeSizeHigh", size >> 16),
                ("argCount", 1),
                ("tempCount", 0),
            ],
        );
        blob[*offset..offset + method_header].copy_from_slice(&encoded);
        blob[offset + method_header..offset + method_header + bytecodes.len()].copy_from_slice(bytecodes);
    }
    blob[cursor..cursor + strings.len()].copy_from_slice(&strings);

    let rom = writer.alloc_segment(&blob).unwrap();
    let method_addrs = method_offsets.iter().map(|o| rom + *o as u64).collect();
    (rom, method_addrs)
}

/// A live-looking VM: RAS, `J9JavaVM`, one cache layer, a class with a
/// method, an object, and a two-node JIT tree
pub struct World
{
    pub image: MemoryImage,
    pub ras: TargetAddr,
    pub vm: TargetAddr,
    pub string_rom: TargetAddr,
    pub string_methods: Vec<TargetAddr>,
    pub map_rom: TargetAddr,
    /// Record headers, oldest first
    pub records: Vec<TargetAddr>,
    pub class: TargetAddr,
    pub ram_method: TargetAddr,
    pub constant_pool: TargetAddr,
    pub object: TargetAddr,
    pub jit_low: TargetAddr,
    pub jit_high: TargetAddr,
}

pub const STRING_METHODS: &[MethodSpec<'static>] = &[
    ("length", "()I", &[0x2a, 0xb4, 0x00, 0x01, 0xbe, 0xac]),
    ("isEmpty", "()Z", &[0x2a, 0xb6, 0x00, 0x02, 0x9a, 0x00, 0x07, 0x04, 0xac]),
];

impl World
{
    pub fn build() -> Self
    {
        Self::build_with(TargetConfig::default())
    }

    pub fn build_with(config: TargetConfig) -> Self
    {
        let abi = config.abi();
        let arch = abi.arch;
        let layouts = VmLayouts::new(abi);

        let mut cache = writer(&config);
        let (string_rom, string_methods) = write_rom_class(&mut cache, &layouts, "java/lang/String", STRING_METHODS);
        let (map_rom, _) = write_rom_class(&mut cache, &layouts, "java/util/HashMap", &[("size", "()I", &[0x03, 0xac])]);
        cache.append_classpath(sccdbg_core::codec::ClasspathKind::Classpath, 2).unwrap();
        cache.append_rom_class(string_rom, 0, 1_700_000_000).unwrap();
        let stale = cache.append_rom_class(map_rom, 1, 1_700_000_001).unwrap();
        cache.mark_stale(stale).unwrap();
        cache.append_orphan(map_rom).unwrap();
        cache.append_compiled_method(string_methods[0], &[1, 2, 3, 4], &[0x90; 12], false).unwrap();
        cache
            .append_attached_data(string_methods[1], sccdbg_core::codec::ATTACHED_DATA_TYPE_JITPROFILE, &[7; 8])
            .unwrap();
        let records = cache.records().to_vec();
        let mut image = cache_image(CACHE_BASE, cache.finish().unwrap());

        let mut heap = Heap::new(HEAP_BASE);

        let descriptor = heap.reserve(layouts.cache_descriptor.size());
        heap.patch(
            descriptor,
            &encode(
                &layouts.cache_descriptor,
                &arch,
                &[
                    ("cacheStartAddress", CACHE_BASE),
                    ("romclassStartAddress", CACHE_BASE + u64::from(READ_WRITE_BYTES)),
                    ("cacheSizeBytes", u64::from(CACHE_SIZE)),
                    ("next", descriptor.value()),
                ],
            ),
        );
        let shared_config = heap.alloc(&encode(
            &layouts.shared_class_config,
            &arch,
            &[("sharedClassCache", 0x2000_0000), ("cacheDescriptorList", descriptor.value()), ("runtimeFlags", 0x1)],
        ));

        let class = heap.reserve(layouts.class.size());
        let constant_pool = heap.alloc(&encode(
            &layouts.constant_pool,
            &arch,
            &[("ramClass", class.value()), ("romConstantPool", string_rom.value() + layouts.rom_class.size() as u64)],
        ));
        heap.patch(
            class,
            &encode(
                &layouts.class,
                &arch,
                &[
                    ("eyecatcher", CLASS_EYECATCHER),
                    ("romClass", string_rom.value()),
                    ("classDepthAndFlags", 0x0002_0001),
                    ("initializeStatus", 1),
                    ("totalInstanceSize", 24),
                    ("ramConstantPool", constant_pool.value()),
                ],
            ),
        );
        let ram_method = heap.alloc(&encode(
            &layouts.method,
            &arch,
            &[
                ("bytecodes", string_methods[1].value() + layouts.rom_method.size() as u64),
                ("constantPool", constant_pool.value() | 0x1),
            ],
        ));
        let object = heap.alloc(&encode(&layouts.object, &arch, &[("clazz", class.value() | 0x2)]));

        let class_name = heap.alloc(&utf8("java/lang/String"));
        let method_name = heap.alloc(&utf8("isEmpty"));
        let signature = heap.alloc(&utf8("()Z"));
        let metadata = |start: u64, end: u64| -> Vec<u8> {
            encode(
                &layouts.jit_metadata,
                &arch,
                &[
                    ("className", class_name.value()),
                    ("methodName", method_name.value()),
                    ("methodSignature", signature.value()),
                    ("ramMethod", ram_method.value()),
                    ("constantPool", constant_pool.value()),
                    ("startPC", start),
                    ("endWarmPC", end),
                    ("totalFrameSize", 6),
                    ("size", 0x200),
                ],
            )
        };
        let jit_low = heap.alloc(&metadata(JIT_LOW.0 + 0x100, JIT_LOW.0 + 0x180));
        let jit_high = heap.alloc(&metadata(JIT_HIGH.0 + 0x40, JIT_HIGH.0 + 0x400));

        let node_size = layouts.jit_range_node.size();
        let root = heap.reserve(node_size);
        let right = heap.alloc(&encode(
            &layouts.jit_range_node,
            &arch,
            &[("start", JIT_HIGH.0), ("end", JIT_HIGH.1), ("methodList", jit_high.value())],
        ));
        let right_field = root + layouts.jit_range_node.offset("rightChild").unwrap() as u64;
        // balance bits ride in the low two bits of the link
        let right_link = (right.value() - right_field.value()) | 0b01;
        heap.patch(
            root,
            &encode(
                &layouts.jit_range_node,
                &arch,
                &[("rightChild", right_link), ("start", JIT_LOW.0), ("end", JIT_LOW.1), ("methodList", jit_low.value())],
            ),
        );
        let tree = heap.alloc(&encode(&layouts.avl_tree, &arch, &[("rootNode", root.value())]));
        let jit_config = heap.alloc(&encode(&layouts.jit_config, &arch, &[("translationArtifacts", tree.value())]));

        let vm = heap.alloc(&encode(
            &layouts.java_vm,
            &arch,
            &[
                ("reserved1_identifier", VM_IDENTIFIER),
                ("sharedClassConfig", shared_config.value()),
                ("jitConfig", jit_config.value()),
                ("runtimeFlags", 0x40),
                ("totalThreadCount", 11),
            ],
        ));
        let mut ras_bytes = encode(
            &layouts.ras,
            &arch,
            &[("bitpattern1", RAS_BITPATTERN), ("bitpattern2", RAS_BITPATTERN), ("vm", vm.value())],
        );
        ras_bytes[..RAS_EYECATCHER.len()].copy_from_slice(RAS_EYECATCHER);
        let ras = heap.alloc(&ras_bytes);

        heap.map_into(&mut image);
        Self {
            image,
            ras,
            vm,
            string_rom,
            string_methods,
            map_rom,
            records,
            class,
            ram_method,
            constant_pool,
            object,
            jit_low,
            jit_high,
        }
    }
}
