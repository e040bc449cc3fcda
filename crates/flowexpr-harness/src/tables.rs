//! Canned symbol tables and packet construction.

use std::collections::HashMap;

use flowexpr_ast::Assignment;
use flowexpr_symtab::{FieldSpec, SymbolTable};
use flowexpr_token::IntFormat;

/// Field ids of the numeric test variables `n0…`.
pub const NUM_FIELD_BASE: u32 = 0;
/// Field ids of the string test variables `s0…`.
pub const STR_FIELD_BASE: u32 = 100;

/// The exhaustive driver's variable table: `nvars` numeric fields of
/// `bits` bits named `n0…`, and `svars` string symbols named `s0…`.
pub fn test_symtab(nvars: usize, svars: usize, bits: u8) -> SymbolTable {
    let mut symtab = SymbolTable::new();
    for i in 0..nvars {
        let spec = FieldSpec::new(NUM_FIELD_BASE + i as u32, bits);
        symtab.add_field(&format!("n{i}"), spec, None, false).expect("fresh name");
    }
    for i in 0..svars {
        let spec = FieldSpec::new(STR_FIELD_BASE + i as u32, 1);
        symtab.add_string(&format!("s{i}"), spec, None).expect("fresh name");
    }
    symtab
}

/// The string values the harness assigns (`"0"` and `"1"`) mapped to ids.
pub fn harness_string_map() -> HashMap<String, u32> {
    HashMap::from([("0".to_string(), 0), ("1".to_string(), 1)])
}

/// A packet (field id → value) realizing an assignment over the test
/// variable table, resolving string values through `string_map`.
pub fn packet_for(
    sigma: &Assignment,
    symtab: &SymbolTable,
    string_map: &HashMap<String, u32>,
) -> HashMap<u32, u128> {
    let mut packet = HashMap::new();
    for (name, value) in sigma.nums() {
        if let Some(symbol) = symtab.get(name) {
            if let Some(field) = symbol.field() {
                packet.insert(field.id, value);
            }
        }
    }
    for (name, value) in sigma.strs() {
        if let Some(symbol) = symtab.get(name) {
            if let Some(field) = symbol.field() {
                if let Some(&id) = string_map.get(value) {
                    packet.insert(field.id, u128::from(id));
                }
            }
        }
    }
    packet
}

/// A realistic network symbol table for end-to-end scenarios: Ethernet,
/// IPv4/IPv6, TCP/UDP, VLAN sub-fields, logical ports as strings, and one
/// must-crack field.
pub fn network_symtab() -> SymbolTable {
    let mut symtab = SymbolTable::new();
    build_network(&mut symtab).expect("canned table registers cleanly");
    symtab
}

fn build_network(symtab: &mut SymbolTable) -> flowexpr_error::Result<()> {
    use IntFormat::{Ethernet, Hex, Ipv4, Ipv6};

    symtab.add_field("eth.src", FieldSpec::new(1, 48).with_format(Ethernet), None, false)?;
    symtab.add_field("eth.dst", FieldSpec::new(2, 48).with_format(Ethernet), None, false)?;
    symtab.add_field("eth.type", FieldSpec::new(3, 16).with_format(Hex), None, false)?;

    symtab.add_field("vlan.tci", FieldSpec::new(4, 16).with_format(Hex), None, false)?;
    symtab.add_subfield("vlan.present", None, "vlan.tci[12]")?;
    symtab.add_subfield("vlan.pcp", Some("vlan.present"), "vlan.tci[13..15]")?;
    symtab.add_subfield("vlan.vid", Some("vlan.present"), "vlan.tci[0..11]")?;

    symtab.add_predicate("ip4", "eth.type == 0x800")?;
    symtab.add_predicate("ip6", "eth.type == 0x86dd")?;
    symtab.add_predicate("ip", "ip4 || ip6")?;

    symtab.add_field("ip.proto", FieldSpec::new(5, 8), Some("ip4"), false)?;
    symtab.add_field("ip.ttl", FieldSpec::new(6, 8), Some("ip"), false)?;
    symtab.add_field("ip4.src", FieldSpec::new(7, 32).with_format(Ipv4), Some("ip4"), false)?;
    symtab.add_field("ip4.dst", FieldSpec::new(8, 32).with_format(Ipv4), Some("ip4"), false)?;
    symtab.add_field("ip6.src", FieldSpec::new(9, 128).with_format(Ipv6), Some("ip6"), false)?;
    symtab.add_field("ip6.dst", FieldSpec::new(10, 128).with_format(Ipv6), Some("ip6"), false)?;

    symtab.add_predicate("tcp", "ip.proto == 6")?;
    symtab.add_predicate("udp", "ip.proto == 17")?;
    symtab.add_field("tcp.src", FieldSpec::new(11, 16), Some("tcp"), false)?;
    symtab.add_field("tcp.dst", FieldSpec::new(12, 16), Some("tcp"), false)?;
    symtab.add_field("udp.src", FieldSpec::new(13, 16), Some("udp"), false)?;
    symtab.add_field("udp.dst", FieldSpec::new(14, 16), Some("udp"), false)?;

    // Tunnel flags cannot take masked matches in the register set they
    // live in, so equalities against them are cracked to exact values.
    symtab.add_field("tun.flags", FieldSpec::new(15, 4).with_format(Hex), None, true)?;

    symtab.add_string("inport", FieldSpec::new(16, 16), None)?;
    symtab.add_string("outport", FieldSpec::new(17, 16), None)?;

    symtab.add_field("reg0", FieldSpec::new(18, 32).with_format(Hex), None, false)?;
    Ok(())
}
