//! End-to-end scenarios over the realistic network symbol table: text in,
//! classifier flows out, with lookup agreeing with direct evaluation.

use std::collections::HashMap;

use flowexpr_ast::{Assignment, Expr, SymbolTable};
use flowexpr_error::ExprError;
use flowexpr_flows::{MatchList, to_matches};
use flowexpr_harness::{Classifier, harness_string_map, network_symtab, packet_for, test_symtab};
use flowexpr_parser::{annotate, compile};
use flowexpr_passes::{normalize, simplify};
use flowexpr_symtab::FieldSpec;

fn pipeline(text: &str, symtab: &SymbolTable) -> Expr {
    normalize(simplify(annotate(compile(text, symtab).unwrap(), symtab).unwrap()))
}

fn flows(text: &str, symtab: &SymbolTable, map: &HashMap<String, u32>) -> MatchList {
    to_matches(pipeline(text, symtab), map)
}

#[test]
fn tcp_port_with_prerequisites_is_one_match() {
    let symtab = network_symtab();
    let annotated =
        annotate(compile("ip4 && tcp.dst == 80", &symtab).unwrap(), &symtab).unwrap();
    assert_eq!(
        simplify(annotated).to_string(),
        "eth.type == 0x800 && ip.proto == 6 && tcp.dst == 80"
    );

    let list = flows("ip4 && tcp.dst == 80", &symtab, &HashMap::new());
    assert_eq!(list.matches.len(), 1);
    assert_eq!(list.n_conjunctions, 0);
    let Expr::And(children) = pipeline("ip4 && tcp.dst == 80", &symtab) else {
        panic!("expected a single conjunction");
    };
    assert_eq!(children.len(), 3);
    assert!(children.iter().all(|c| matches!(c, Expr::Cmp(_))));
}

#[test]
fn port_set_lowers_to_two_matches() {
    let symtab = network_symtab();
    let list = flows("tcp.dst == {80, 443}", &symtab, &HashMap::new());
    assert_eq!(list.matches.len(), 2);
    assert_eq!(list.n_conjunctions, 0);
    assert!(
        list.matches
            .iter()
            .all(|m| m.fields.values().any(|f| f.name == "tcp.dst"))
    );
}

#[test]
fn cidr_source_is_a_single_masked_match() {
    let symtab = network_symtab();
    let list = flows("ip4.src == 10.0.0.0/8", &symtab, &HashMap::new());
    assert_eq!(list.matches.len(), 1);
    let src = list.matches[0].fields.values().find(|f| f.name == "ip4.src").unwrap();
    assert_eq!((src.value, src.mask), (0x0a00_0000, 0xff00_0000));
}

#[test]
fn single_bit_of_a_wide_field() {
    let symtab = network_symtab();
    let list = flows("eth.src[0] == 1", &symtab, &HashMap::new());
    assert_eq!(list.matches.len(), 1);
    let src = list.matches[0].fields.values().find(|f| f.name == "eth.src").unwrap();
    assert_eq!((src.value, src.mask), (1, 1));
}

#[test]
fn distributed_conjunctions_agree_with_evaluation() {
    // (a && b) || (a && c) over three 3-bit variables: classifier lookup
    // agrees with direct evaluation on all 2^9 assignments.
    let symtab = test_symtab(3, 0, 3);
    let text = "(n0 && n1) || (n0 && n2)";
    let parsed = compile(text, &symtab).unwrap();
    let norm = pipeline(text, &symtab);
    let Expr::Or(disjuncts) = &norm else { panic!("expected two disjuncts, got {norm}") };
    assert_eq!(disjuncts.len(), 2);

    let map = harness_string_map();
    let mut classifier = Classifier::new();
    classifier.insert_matches(&to_matches(norm.clone(), &map), 0);

    for a in 0..8u128 {
        for b in 0..8u128 {
            for c in 0..8u128 {
                let mut sigma = Assignment::new();
                sigma.set_num("n0", a);
                sigma.set_num("n1", b);
                sigma.set_num("n2", c);
                let packet = packet_for(&sigma, &symtab, &map);
                assert_eq!(
                    classifier.lookup(&packet),
                    parsed.evaluate(&sigma),
                    "diverges on n0={a} n1={b} n2={c}"
                );
            }
        }
    }
}

#[test]
fn self_recursive_prerequisite_fails_annotation() {
    let mut symtab = SymbolTable::new();
    symtab
        .add_field("self_recurse", FieldSpec::new(40, 8), Some("self_recurse != 0"), false)
        .unwrap();
    let parsed = compile("self_recurse == 7", &symtab).unwrap();
    let err = annotate(parsed, &symtab).unwrap_err();
    assert_eq!(err, ExprError::PrereqCycle { name: "self_recurse".into() });
}

#[test]
fn must_crack_field_never_installs_a_mask() {
    let symtab = network_symtab();
    // tun.flags is must-crack: a masked equality expands to exact values.
    let list = flows("tun.flags == 0x1/0x1", &symtab, &HashMap::new());
    assert_eq!(list.matches.len(), 8);
    for m in &list.matches {
        let f = m.fields.values().find(|f| f.name == "tun.flags").unwrap();
        assert_eq!(f.mask, 0xf, "expected exact-value match, got mask {:#x}", f.mask);
        assert_eq!(f.value & 1, 1);
    }
}

#[test]
fn vlan_subfield_round_trip_through_flows() {
    let symtab = network_symtab();
    let list = flows("vlan.pcp == 5", &symtab, &HashMap::new());
    // One match for the pcp bits themselves; the vlan.present prereq is a
    // one-bit disequality, which folds into the same tuple.
    assert_eq!(list.matches.len(), 1);
    let tci = list.matches[0].fields.values().find(|f| f.name == "vlan.tci").unwrap();
    assert_eq!(tci.mask, 0xe000 | 0x1000);
    assert_eq!(tci.value, 0xa000 | 0x1000);
}

#[test]
fn logical_ports_resolve_and_group() {
    let symtab = network_symtab();
    let map: HashMap<String, u32> =
        [("lp1".to_string(), 1), ("lp2".to_string(), 2)].into_iter().collect();
    let list = flows("inport == {\"lp1\", \"lp2\"} && tcp.dst == {80, 443}", &symtab, &map);
    assert_eq!(list.n_conjunctions, 1);
    let members = list.matches.iter().filter(|m| !m.conjunctions.is_empty()).count();
    assert_eq!(members, 4);
}
