extern crate bootfdt;

use bootfdt::base::Fdt;
use bootfdt::edit::FdtEdit;
use bootfdt::error::FdtError;

/// A small packed tree: root with a `model` string and a `chosen`
/// subnode carrying `bootargs`.
fn packed_fixture() -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    let mut edit = FdtEdit::create_empty_tree(&mut buf).unwrap();
    let root = edit.path_offset("/").unwrap();
    edit.setprop_str(root, "model", "test,board").unwrap();
    let chosen = edit.add_subnode(root, "chosen").unwrap();
    edit.setprop_str(chosen, "bootargs", "console=ttyS0").unwrap();
    let size = edit.finish().unwrap();
    buf.truncate(size);
    buf
}

#[test]
fn open_then_pack_is_byte_identical() {
    let blob = packed_fixture();

    let mut buf = vec![0u8; 4096];
    buf[..blob.len()].copy_from_slice(&blob);
    let mut edit = FdtEdit::open(&mut buf).unwrap();
    // While open the whole buffer counts as the tree.
    assert_eq!(edit.as_fdt().totalsize(), 4096);
    let size = edit.finish().unwrap();

    assert_eq!(size, blob.len());
    assert_eq!(&buf[..size], &blob[..]);
}

#[test]
fn open_into_copies_and_packs_back() {
    let blob = packed_fixture();
    let fdt = Fdt::from_bytes(&blob).unwrap();

    let mut buf = vec![0u8; 4096];
    let edit = FdtEdit::open_into(&fdt, &mut buf).unwrap();
    let size = edit.finish().unwrap();
    assert_eq!(&buf[..size], &blob[..]);
}

#[test]
fn setprop_is_idempotent() {
    let blob = packed_fixture();

    let mut once = vec![0u8; 4096];
    once[..blob.len()].copy_from_slice(&blob);
    let mut edit = FdtEdit::open(&mut once).unwrap();
    let chosen = edit.path_offset("/chosen").unwrap();
    edit.setprop_str(chosen, "bootargs", "root=/dev/mmcblk0p2")
        .unwrap();
    let once_size = edit.finish().unwrap();

    let mut twice = vec![0u8; 4096];
    twice[..blob.len()].copy_from_slice(&blob);
    let mut edit = FdtEdit::open(&mut twice).unwrap();
    let chosen = edit.path_offset("/chosen").unwrap();
    edit.setprop_str(chosen, "bootargs", "root=/dev/mmcblk0p2")
        .unwrap();
    edit.setprop_str(chosen, "bootargs", "root=/dev/mmcblk0p2")
        .unwrap();
    let twice_size = edit.finish().unwrap();

    assert_eq!(once_size, twice_size);
    assert_eq!(&once[..once_size], &twice[..twice_size]);
}

#[test]
fn setprop_resizes_in_place() {
    let blob = packed_fixture();
    let mut buf = vec![0u8; 4096];
    buf[..blob.len()].copy_from_slice(&blob);
    let mut edit = FdtEdit::open(&mut buf).unwrap();

    let chosen = edit.path_offset("/chosen").unwrap();
    edit.setprop_str(chosen, "bootargs", "quiet").unwrap();
    assert_eq!(edit.property(chosen, "bootargs").unwrap(), b"quiet\0");

    edit.setprop_str(chosen, "bootargs", "console=ttyS0 root=/dev/nfs rw")
        .unwrap();
    assert_eq!(
        edit.property(chosen, "bootargs").unwrap(),
        b"console=ttyS0 root=/dev/nfs rw\0"
    );

    // The value region shrank and grew in place; the tree is still
    // sound after packing.
    let size = edit.finish().unwrap();
    Fdt::from_bytes(&buf[..size]).unwrap();
}

#[test]
fn added_subnodes_resolve_by_path() {
    let blob = packed_fixture();
    let mut buf = vec![0u8; 4096];
    buf[..blob.len()].copy_from_slice(&blob);
    let mut edit = FdtEdit::open(&mut buf).unwrap();

    let root = edit.path_offset("/").unwrap();
    let soc = edit.add_subnode(root, "soc").unwrap();
    assert_eq!(edit.path_offset("/soc").unwrap(), soc);

    let timer = edit.add_subnode(soc, "timer@101").unwrap();
    assert_eq!(edit.path_offset("/soc/timer@101").unwrap(), timer);

    assert_eq!(
        edit.add_subnode(soc, "timer@101").unwrap_err(),
        FdtError::Exists
    );
}

#[test]
fn string_table_deduplicates_names() {
    let mut buf = vec![0u8; 2048];
    let mut edit = FdtEdit::create_empty_tree(&mut buf).unwrap();
    let root = edit.path_offset("/").unwrap();
    let a = edit.add_subnode(root, "a").unwrap();
    edit.setprop_u32(a, "reg", 1).unwrap();
    let strings_before = edit.as_fdt().size_dt_strings();

    let root = edit.path_offset("/").unwrap();
    let b = edit.add_subnode(root, "b").unwrap();
    edit.setprop_u32(b, "reg", 2).unwrap();
    // The second `reg` reuses the first one's table entry.
    assert_eq!(edit.as_fdt().size_dt_strings(), strings_before);
}

#[test]
fn delprop_and_del_node_splice_out() {
    let blob = packed_fixture();
    let mut buf = vec![0u8; 4096];
    buf[..blob.len()].copy_from_slice(&blob);
    let mut edit = FdtEdit::open(&mut buf).unwrap();

    let chosen = edit.path_offset("/chosen").unwrap();
    edit.delprop(chosen, "bootargs").unwrap();
    assert_eq!(
        edit.property(chosen, "bootargs").unwrap_err(),
        FdtError::NotFound
    );
    assert_eq!(
        edit.delprop(chosen, "bootargs").unwrap_err(),
        FdtError::NotFound
    );

    edit.del_node(chosen).unwrap();
    assert_eq!(
        edit.path_offset("/chosen").unwrap_err(),
        FdtError::NotFound
    );

    // The root's own property survived the splices.
    let root = edit.path_offset("/").unwrap();
    assert_eq!(edit.property(root, "model").unwrap(), b"test,board\0");

    let size = edit.finish().unwrap();
    Fdt::from_bytes(&buf[..size]).unwrap();
}

#[test]
fn exhausted_capacity_fails_closed() {
    let blob = packed_fixture();
    let len = blob.len();
    // No slack at all: the tree fills its buffer exactly.
    let mut buf = blob.clone();
    let mut edit = FdtEdit::open(&mut buf).unwrap();

    let chosen = edit.path_offset("/chosen").unwrap();
    assert_eq!(
        edit.setprop(chosen, "linux,initrd-start", &[0; 8])
            .unwrap_err(),
        FdtError::NoSpace
    );
    // The failed call left the tree untouched.
    assert_eq!(
        edit.property(chosen, "linux,initrd-start").unwrap_err(),
        FdtError::NotFound
    );
    let size = edit.finish().unwrap();
    assert_eq!(size, len);
    assert_eq!(&buf[..], &blob[..]);
}

#[test]
fn mem_rsv_edits_shift_later_blocks() {
    let mut buf = vec![0u8; 2048];
    let mut edit = FdtEdit::create_empty_tree(&mut buf).unwrap();
    let root = edit.path_offset("/").unwrap();
    edit.setprop_u32(root, "#size-cells", 1).unwrap();

    edit.add_mem_rsv(0x8000_0000, 0x4000).unwrap();
    edit.add_mem_rsv(0x9000_0000, 0x2000).unwrap();
    assert_eq!(edit.as_fdt().reserved_entries().count(), 2);
    // The structure block moved but node lookups still work.
    let root = edit.path_offset("/").unwrap();
    assert_eq!(edit.property(root, "#size-cells").unwrap(), &1u32.to_be_bytes());

    edit.del_mem_rsv(0).unwrap();
    let entries: Vec<_> = edit.as_fdt().reserved_entries().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].address, 0x9000_0000);

    let size = edit.finish().unwrap();
    Fdt::from_bytes(&buf[..size]).unwrap();
}

#[test]
fn create_empty_tree_needs_room() {
    let mut tiny = [0u8; 40];
    assert!(matches!(
        FdtEdit::create_empty_tree(&mut tiny),
        Err(FdtError::NoSpace)
    ));

    let mut just_enough = [0u8; 72];
    let edit = FdtEdit::create_empty_tree(&mut just_enough).unwrap();
    assert!(edit.path_offset("/").is_ok());
}
