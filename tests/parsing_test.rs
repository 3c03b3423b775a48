extern crate bootfdt;

use bootfdt::base::lookup::{self, MachineDesc};
use bootfdt::base::Fdt;
use bootfdt::edit::FdtEdit;
use bootfdt::error::FdtError;
use bootfdt::prelude::*;
use bootfdt::tree::DeviceTree;

/// A fixture tree assembled through the editor:
///
/// ```text
/// / {
///     compatible = "samsung,exynos5420", "samsung,exynos5";
///     #address-cells = <1>;
///     #size-cells = <1>;
///     chosen { bootargs = "console=ttySAC1,115200"; };
///     memory@0 { device_type = "memory"; reg = <0x20000000 0x10000000>; };
///     soc {
///         serial@12c00000 {
///             compatible = "samsung,exynos4210-uart";
///             phandle = <7>;
///         };
///     };
/// };
/// ```
///
/// plus one reservation entry. Subnodes land in front of their elder
/// siblings, so the stream order is chosen, memory@0, soc.
fn fixture() -> Vec<u8> {
    let mut buf = vec![0u8; 4096];
    let mut edit = FdtEdit::create_empty_tree(&mut buf).unwrap();

    let root = edit.path_offset("/").unwrap();
    edit.setprop(
        root,
        "compatible",
        b"samsung,exynos5420\0samsung,exynos5\0",
    )
    .unwrap();
    edit.setprop_u32(root, "#address-cells", 1).unwrap();
    edit.setprop_u32(root, "#size-cells", 1).unwrap();

    let soc = edit.add_subnode(root, "soc").unwrap();
    let serial = edit.add_subnode(soc, "serial@12c00000").unwrap();
    edit.setprop(serial, "compatible", b"samsung,exynos4210-uart\0")
        .unwrap();
    edit.setprop_u32(serial, "phandle", 7).unwrap();

    let root = edit.path_offset("/").unwrap();
    let memory = edit.add_subnode(root, "memory@0").unwrap();
    edit.setprop(memory, "device_type", b"memory\0").unwrap();
    edit.setprop(memory, "reg", &[0x20u8, 0, 0, 0, 0x10, 0, 0, 0])
        .unwrap();

    let root = edit.path_offset("/").unwrap();
    let chosen = edit.add_subnode(root, "chosen").unwrap();
    edit.setprop_str(chosen, "bootargs", "console=ttySAC1,115200")
        .unwrap();

    edit.add_mem_rsv(0x4000_0000, 0x10000).unwrap();

    let size = edit.finish().unwrap();
    buf.truncate(size);
    buf
}

/// A blob built token by token, for feeding the parser streams the
/// editor would never produce. `tokens` become the structure block
/// verbatim.
fn raw_blob(tokens: &[u32], strings: &[u8]) -> Vec<u8> {
    const HDR: usize = 40;
    const RSV: usize = 16;
    let struct_size = tokens.len() * 4;
    let mut buf = vec![0u8; HDR + RSV + struct_size + strings.len()];

    let fields: [u32; 10] = [
        0xd00d_feed,
        buf.len() as u32,
        (HDR + RSV) as u32,
        (HDR + RSV + struct_size) as u32,
        HDR as u32,
        0x11,
        0x10,
        0,
        strings.len() as u32,
        struct_size as u32,
    ];
    for (i, field) in fields.iter().enumerate() {
        buf[i * 4..i * 4 + 4].copy_from_slice(&field.to_be_bytes());
    }
    for (i, tok) in tokens.iter().enumerate() {
        let off = HDR + RSV + i * 4;
        buf[off..off + 4].copy_from_slice(&tok.to_be_bytes());
    }
    let off = HDR + RSV + struct_size;
    buf[off..].copy_from_slice(strings);
    buf
}

#[test]
fn totalsize_probe_and_header_checks() {
    let blob = fixture();
    assert_eq!(Fdt::read_totalsize(&blob).unwrap(), blob.len());

    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert_eq!(fdt.magic(), 0xd00d_feed);
    assert_eq!(fdt.version(), 0x11);
    assert_eq!(fdt.totalsize(), blob.len());

    let mut bad = blob.clone();
    bad[0] = 0;
    assert_eq!(Fdt::from_bytes(&bad).unwrap_err(), FdtError::BadMagic);

    let mut bad = blob.clone();
    // version = 0xf, below the supported floor.
    bad[20..24].copy_from_slice(&0xfu32.to_be_bytes());
    assert_eq!(Fdt::from_bytes(&bad).unwrap_err(), FdtError::BadVersion);

    assert_eq!(
        Fdt::from_bytes(&blob[..blob.len() - 1]).unwrap_err(),
        FdtError::Truncated
    );
}

#[test]
fn path_and_property_lookup() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();

    let serial = lookup::path_offset(&fdt, "/soc/serial@12c00000").unwrap();
    assert_eq!(lookup::node_name(&fdt, serial).unwrap(), "serial@12c00000");
    // A bare component matches through the unit address, and repeated
    // slashes are tolerated.
    assert_eq!(lookup::path_offset(&fdt, "/soc/serial").unwrap(), serial);
    assert_eq!(lookup::path_offset(&fdt, "//soc//serial/").unwrap(), serial);

    assert_eq!(lookup::property_u32(&fdt, serial, "phandle").unwrap(), 7);
    let root = lookup::root_offset(&fdt).unwrap();
    assert_eq!(
        lookup::property(&fdt, root, "compatible").unwrap(),
        b"samsung,exynos5420\0samsung,exynos5\0"
    );

    assert_eq!(
        lookup::path_offset(&fdt, "/soc/nope").unwrap_err(),
        FdtError::NotFound
    );
    assert_eq!(
        lookup::property(&fdt, serial, "reg").unwrap_err(),
        FdtError::NotFound
    );
    assert_eq!(
        lookup::path_offset(&fdt, "soc").unwrap_err(),
        FdtError::BadPath
    );
}

#[test]
fn nodes_and_props_iterate_in_stream_order() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();

    let mut names = Vec::new();
    let mut nodes = fdt.nodes();
    while let Some(node) = nodes.next().unwrap() {
        names.push(node.name().unwrap());
    }
    assert_eq!(names, ["", "chosen", "memory@0", "soc", "serial@12c00000"]);

    let mut compatible_count = 0;
    let mut props = fdt.props();
    while let Some(prop) = props.next().unwrap() {
        if prop.name().unwrap() == "compatible" {
            compatible_count += 1;
        }
    }
    assert_eq!(compatible_count, 2);

    let mut uarts = fdt.compatible_nodes("samsung,exynos4210-uart");
    let node = uarts.next().unwrap().unwrap();
    assert_eq!(node.name().unwrap(), "serial@12c00000");
    assert!(uarts.next().unwrap().is_none());
}

#[test]
fn reservation_table_round_trips() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();
    let entries: Vec<_> = fdt.reserved_entries().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].address, 0x4000_0000);
    assert_eq!(entries[0].size, 0x10000);
}

struct Machine {
    name: &'static str,
    compat: &'static [&'static str],
}

impl MachineDesc for Machine {
    fn name(&self) -> &str {
        self.name
    }
    fn compatibles(&self) -> &[&str] {
        self.compat
    }
}

#[test]
fn most_specific_compatible_wins_machine_match() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();
    let root = lookup::root_offset(&fdt).unwrap();

    assert!(lookup::is_compatible(&fdt, root, "samsung,exynos5").unwrap());
    assert!(!lookup::is_compatible(&fdt, root, "samsung,exynos4").unwrap());
    assert_eq!(
        lookup::compat_score(&fdt, root, "samsung,exynos5420")
            .unwrap()
            .unwrap()
            .get(),
        1
    );
    assert_eq!(
        lookup::compat_score(&fdt, root, "samsung,exynos5")
            .unwrap()
            .unwrap()
            .get(),
        2
    );

    // The generic candidate comes first but the board-specific one
    // matches an earlier string in the device's list, so it wins.
    let machines = [
        Machine {
            name: "A",
            compat: &["samsung,exynos5"],
        },
        Machine {
            name: "B",
            compat: &["samsung,exynos5420"],
        },
    ];
    let best = lookup::match_machine(&fdt, &machines).unwrap().unwrap();
    assert_eq!(best.name, "B");

    let none: &[Machine] = &[];
    assert!(lookup::match_machine(&fdt, none).unwrap().is_none());
}

#[test]
fn truncated_streams_end_token_iteration_cleanly() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();
    let full = fdt.tokens().count();
    assert!(full > 1);

    // A blob cut mid property value: the plain iterator stops rather
    // than reading out of bounds.
    let cut = raw_blob(&[1, 0, 3, 64, 0], b"reg\0");
    let fdt = Fdt::from_bytes(&cut).unwrap();
    assert_eq!(fdt.tokens().count(), 1);
}

#[test]
fn unflatten_builds_paths_and_links() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();
    let tree = DeviceTree::new(fdt).unwrap();

    assert_eq!(tree.root().path(), "/");
    assert_eq!(tree.root().name(), "");

    let serial = tree.node("/soc/serial@12c00000").unwrap();
    assert_eq!(serial.name(), "serial@12c00000");
    assert_eq!(serial.parent().unwrap().path(), "/soc");
    assert!(serial.parent().unwrap().parent().unwrap().parent().is_none());

    let children: Vec<_> = tree
        .root()
        .children()
        .map(|n| n.name().to_owned())
        .collect();
    assert_eq!(children, ["chosen", "memory@0", "soc"]);

    let by_phandle = tree.find_phandle(7).unwrap();
    assert_eq!(by_phandle.path(), "/soc/serial@12c00000");
    assert!(tree.find_phandle(8).is_none());

    let mut uarts = tree.compatible_nodes("samsung,exynos4210-uart");
    assert_eq!(uarts.next().unwrap().path(), "/soc/serial@12c00000");
    assert!(uarts.next().is_none());
}

#[test]
fn unflatten_synthesizes_missing_name_properties() {
    let blob = fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();
    let tree = DeviceTree::new(fdt).unwrap();

    // No node of the fixture carries an explicit `name` property; each
    // gets one from its leaf name minus the unit address.
    let serial = tree.node("/soc/serial@12c00000").unwrap();
    let name = serial
        .props()
        .find(|p| p.name() == Ok("name"))
        .expect("synthesized name property");
    assert_eq!(name.raw(), b"serial\0");

    let memory = tree.node("/memory@0").unwrap();
    let name = memory.props().find(|p| p.name() == Ok("name")).unwrap();
    assert_eq!(name.raw(), b"memory\0");

    // Wire properties keep stream order, with the synthesized name
    // sealed in last.
    let names: Vec<_> = serial
        .props()
        .map(|p| p.name().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["phandle", "compatible", "name"]);
}

#[test]
fn unflatten_rejects_structural_defects() {
    // A stray end-of-node token at the top level.
    let blob = raw_blob(&[1, 0, 2, 2, 9], b"");
    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert!(matches!(DeviceTree::new(fdt), Err(FdtError::BadStructure)));

    // The root never closes.
    let blob = raw_blob(&[1, 0, 9], b"");
    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert!(matches!(DeviceTree::new(fdt), Err(FdtError::BadStructure)));

    // A property after the first subnode closed.
    let blob = raw_blob(&[1, 0, 1, 0, 2, 3, 0, 0, 2, 9], b"x\0");
    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert!(matches!(DeviceTree::new(fdt), Err(FdtError::BadStructure)));

    // A stream that just stops; no partial tree comes back.
    let blob = raw_blob(&[1, 0], b"");
    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert!(matches!(DeviceTree::new(fdt), Err(FdtError::Truncated)));

    // An empty stream has no root.
    let blob = raw_blob(&[9], b"");
    let fdt = Fdt::from_bytes(&blob).unwrap();
    assert!(matches!(DeviceTree::new(fdt), Err(FdtError::BadStructure)));
}
