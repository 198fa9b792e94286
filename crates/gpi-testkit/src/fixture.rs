//! Ready-made designs used across the adapter and integration tests.

use crate::design::{Design, Drive, Lang, NodeKind, NodeValue};

/// Verilog toplevel `top` with a VHDL instance `u_vhdl` inside it.
///
/// ```text
/// top                       (top.sv)
///   clk, data[7:0]          nets
///   rst_n, counter[7:0]     regs
///   count, temp, msg        integer, real, 8-char string
///   mem[0:3]                array of 8-bit regs
///   pkt { valid, payload[7:0] }
///   WIDTH = 8               parameter
///   loop[0..3] { q }        generate loop
///   cond_blk { flag }       conditional generate
///   always_ff               process
///   u_sub { state[1:0] }    Verilog instance (sub.sv)
///   u_vhdl                  VHDL instance (leaf.vhd)
///     sig, vec(3 downto 0), cnt, mode, label, ratio, proc
/// pkg::DEPTH = 16
/// ```
pub fn mixed_design() -> Design {
    let mut d = Design::new();
    let top = d.root("top", Lang::Verilog);
    d.set_definition(top, "top", "top.sv");
    d.net(top, "clk", 1);
    d.reg(top, "rst_n", 1);
    d.net(top, "data", 8);
    d.reg(top, "counter", 8);
    d.add(top, "count", NodeKind::Integer);
    d.add(top, "temp", NodeKind::Real);
    d.add(top, "msg", NodeKind::Str { len: 8 });
    d.memory(top, "mem", 4, 8);
    let pkt = d.add(top, "pkt", NodeKind::Struct);
    d.reg(pkt, "valid", 1);
    d.reg(pkt, "payload", 8);
    let width = d.add(top, "WIDTH", NodeKind::Param);
    set(&mut d, width, NodeValue::Int(8));
    for block in d.generate(top, "loop", 4) {
        d.net(block, "q", 1);
    }
    let cond = d.add(top, "cond_blk", NodeKind::Block);
    d.reg(cond, "flag", 1);
    d.add(top, "always_ff", NodeKind::Process);

    let sub = d.add(top, "u_sub", NodeKind::Scope);
    d.set_definition(sub, "sub", "sub.sv");
    d.reg(sub, "state", 2);

    let vhdl = d.add_lang(top, "u_vhdl", NodeKind::Scope, Lang::Vhdl);
    d.set_definition(vhdl, "vhdl_leaf", "leaf.vhd");
    d.net(vhdl, "sig", 1);
    d.add(
        vhdl,
        "vec",
        NodeKind::Net {
            width: 4,
            range: Some((3, 0)),
        },
    );
    d.add(vhdl, "cnt", NodeKind::Integer);
    d.add(
        vhdl,
        "mode",
        NodeKind::Enum {
            literals: vec!["IDLE".into(), "RUN".into(), "DONE".into()],
        },
    );
    d.add(vhdl, "label", NodeKind::Str { len: 8 });
    d.add(vhdl, "ratio", NodeKind::Real);
    d.add(vhdl, "proc", NodeKind::Process);

    let pkg = d.package("pkg");
    let depth = d.add(pkg, "DEPTH", NodeKind::Param);
    set(&mut d, depth, NodeValue::Int(16));
    d
}

/// VHDL toplevel `tb`.
///
/// ```text
/// tb                        (tb.vhd)
///   clk                     std_logic
///   bus(7 downto 0)         std_logic_vector
///   count, state, name      integer, enum, 6-char string
///   gen[0..2] { s }         generate loop
///   u_inst { busy }         entity instance
///   stim                    process
/// ```
pub fn vhdl_design() -> Design {
    let mut d = Design::new();
    let tb = d.root("tb", Lang::Vhdl);
    d.set_definition(tb, "tb", "tb.vhd");
    d.net(tb, "clk", 1);
    d.net(tb, "bus", 8);
    d.add(tb, "count", NodeKind::Integer);
    d.add(
        tb,
        "state",
        NodeKind::Enum {
            literals: vec!["S0".into(), "S1".into(), "S2".into(), "S3".into()],
        },
    );
    d.add(tb, "name", NodeKind::Str { len: 6 });
    for block in d.generate(tb, "gen", 3) {
        d.net(block, "s", 1);
    }
    let inst = d.add(tb, "u_inst", NodeKind::Scope);
    d.net(inst, "busy", 1);
    d.add(tb, "stim", NodeKind::Process);
    d
}

fn set(d: &mut Design, node: crate::design::NodeId, value: NodeValue) {
    // Fixture values always fit their nodes.
    let _ = d.write(node, value, Drive::Deposit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_design_shape() {
        let d = mixed_design();
        let top = d.roots()[0];
        let vhdl = d.child(top, "u_vhdl").unwrap();
        assert_eq!(d.lang(vhdl), Some(Lang::Vhdl));
        let gens: Vec<&str> = d
            .children(top)
            .iter()
            .filter(|&&c| d.kind(c) == Some(&NodeKind::GenBlock))
            .map(|&c| d.name(c).unwrap())
            .collect();
        assert_eq!(gens, vec!["loop[0]", "loop[1]", "loop[2]", "loop[3]"]);
        let width = d.child(top, "WIDTH").unwrap();
        assert_eq!(d.value(width), Some(NodeValue::Int(8)));
    }

    #[test]
    fn vhdl_design_shape() {
        let d = vhdl_design();
        let tb = d.roots()[0];
        assert_eq!(d.lang(tb), Some(Lang::Vhdl));
        assert!(d.lookup(tb, "u_inst.busy").is_some());
        assert!(d.packages().is_empty());
    }
}
