use flowguard_core::analysis::{
    AnalysisContext, ArgPosition, BackwardPropagation, CallGraph, MarkedFunctionInfo,
};
use flowguard_core::ir::{FunctionId, Module, ModuleBuilder, ValueRef};
use flowguard_core::seeds::ResolvedSeed;
use flowguard_core::AnalysisConfig;

fn seed(module: &Module, name: &str, position: ArgPosition, arg_name: &str) -> ResolvedSeed {
    ResolvedSeed {
        function: module.function_by_name(name).expect("seed function"),
        info: MarkedFunctionInfo {
            callee: name.to_string(),
            position,
            arg_name: arg_name.to_string(),
        },
    }
}

fn run(module: &Module, seeds: &[ResolvedSeed]) -> (AnalysisContext, usize) {
    let config = AnalysisConfig::default();
    let callgraph = CallGraph::build(module);
    let bound = callgraph.max_path_length();
    let mut ctx = AnalysisContext::new();
    let rounds = BackwardPropagation::new(module, &callgraph, &config, bound).run(&mut ctx, seeds);
    assert!(rounds <= bound);
    (ctx, rounds)
}

fn id(module: &Module, name: &str) -> FunctionId {
    module.function_by_name(name).expect("function")
}

/// a -> b -> c -> d, each passing its second argument on as the callee's
/// second argument unless `b_absorbs`, in which case b passes a constant.
fn linear_chain(b_absorbs: bool) -> Module {
    let mut mb = ModuleBuilder::new("chain");
    {
        let mut d = mb.function("d");
        d.arg("x");
        d.arg("y");
        d.ret(None);
    }
    {
        let mut c = mb.function("c");
        c.arg("c1");
        let second = c.arg("c2");
        c.call_void("d", vec![ValueRef::Const(0), second]);
        c.ret(None);
    }
    {
        let mut b = mb.function("b");
        b.arg("b1");
        let second = b.arg("b2");
        let passed = if b_absorbs { ValueRef::Const(7) } else { second };
        b.call_void("c", vec![ValueRef::Const(0), passed]);
        b.ret(None);
    }
    {
        let mut a = mb.function("a");
        a.call_void("b", vec![ValueRef::Const(1), ValueRef::Const(2)]);
        a.ret(None);
    }
    mb.build()
}

#[test]
fn input_propagates_up_a_forwarding_chain() {
    let module = linear_chain(false);
    let (ctx, rounds) = run(&module, &[seed(&module, "d", ArgPosition::Argument(2), "y")]);
    assert_eq!(rounds, 3);

    for name in ["a", "b", "c"] {
        assert!(ctx.is_marked(id(&module, name)), "{name} should be marked");
    }
    assert!(!ctx.is_marked(id(&module, "d")));
    for name in ["b", "c", "d"] {
        assert!(ctx.is_input_function(id(&module, name)), "{name} should deliver input");
    }
    assert!(!ctx.is_input_function(id(&module, "a")));

    let a = ctx.state(id(&module, "a")).expect("state for a");
    assert_eq!(
        a.infos,
        vec![MarkedFunctionInfo {
            callee: "b".into(),
            position: ArgPosition::Argument(2),
            arg_name: "b2".into()
        }]
    );
}

#[test]
fn constant_argument_stops_propagation() {
    let module = linear_chain(true);
    let (ctx, rounds) = run(&module, &[seed(&module, "d", ArgPosition::Argument(2), "y")]);
    assert_eq!(rounds, 2);

    assert!(ctx.is_marked(id(&module, "c")));
    assert!(ctx.is_marked(id(&module, "b")));
    assert!(!ctx.is_input_function(id(&module, "b")));
    assert!(!ctx.is_marked(id(&module, "a")));
    assert_eq!(ctx.stats().marked_functions, 2);
}

#[test]
fn returned_value_marks_wrapper_as_input() {
    let mut mb = ModuleBuilder::new("ret");
    mb.declare("getenv", flowguard_core::ir::Ty::Int(64));
    {
        let mut w = mb.function("bb.wrap");
        let r = w.call("r", "getenv", Vec::new());
        let widened = w.add("widened", r, ValueRef::Const(0));
        w.ret(Some(widened));
    }
    {
        let mut m = mb.function("bb.main");
        m.call("v", "bb.wrap", Vec::new());
        m.ret(None);
    }
    let module = mb.build();
    let (ctx, _) = run(&module, &[seed(&module, "getenv", ArgPosition::Return, "rax")]);

    let wrap = id(&module, "bb.wrap");
    let main = id(&module, "bb.main");
    assert!(ctx.is_input_function(wrap));
    assert!(ctx.is_marked(main));
    let info = &ctx.state(main).expect("main state").infos[0];
    assert_eq!(info.position, ArgPosition::Return);
    assert_eq!(info.arg_name, "rax");
}

#[test]
fn void_call_result_is_read_from_return_register() {
    let mut mb = ModuleBuilder::new("regret");
    let rax = mb.global("rax");
    {
        let mut s = mb.function("bb.read_input");
        s.ret(None);
    }
    {
        let mut g = mb.function("bb.g");
        g.call_void("bb.read_input", Vec::new());
        let v = g.load("v", rax);
        let w = g.add("w", v, ValueRef::Const(1));
        g.store(w, rax);
        g.ret(None);
    }
    {
        let mut h = mb.function("bb.h");
        h.call_void("bb.g", Vec::new());
        h.ret(None);
    }
    let module = mb.build();
    let (ctx, _) = run(&module, &[seed(&module, "bb.read_input", ArgPosition::Return, "")]);

    assert!(ctx.is_input_function(id(&module, "bb.g")));
    assert!(ctx.is_marked(id(&module, "bb.h")));
}

#[test]
fn register_argument_maps_to_caller_register_param() {
    let mut mb = ModuleBuilder::new("regs");
    let rdi = mb.global("rdi");
    let rsi = mb.global("rsi");
    {
        let mut sink = mb.function("bb.sink");
        sink.entry_metadata(vec![rdi]);
        sink.ret(None);
    }
    {
        let mut mid = mb.function("bb.mid");
        mid.entry_metadata(vec![rdi, rsi]);
        let x = mid.load("x", rsi);
        mid.store(x, rdi);
        mid.call_void("bb.sink", Vec::new());
        mid.ret(None);
    }
    {
        let mut top = mb.function("bb.top");
        top.call_void("bb.mid", Vec::new());
        top.ret(None);
    }
    let module = mb.build();
    let (ctx, _) = run(&module, &[seed(&module, "bb.sink", ArgPosition::Argument(1), "rdi")]);

    assert!(ctx.is_input_function(id(&module, "bb.mid")));
    let top = ctx.state(id(&module, "bb.top")).expect("top state");
    assert_eq!(
        top.infos,
        vec![MarkedFunctionInfo {
            callee: "bb.mid".into(),
            position: ArgPosition::Argument(2),
            arg_name: "rsi".into()
        }]
    );
}

#[test]
fn register_never_written_before_call_stops_propagation() {
    let mut mb = ModuleBuilder::new("unset");
    let rdi = mb.global("rdi");
    {
        let mut sink = mb.function("bb.sink");
        sink.entry_metadata(vec![rdi]);
        sink.ret(None);
    }
    {
        let mut mid = mb.function("bb.mid");
        mid.entry_metadata(vec![rdi]);
        mid.call_void("bb.sink", Vec::new());
        mid.ret(None);
    }
    {
        let mut top = mb.function("bb.top");
        top.entry_metadata(vec![rdi]);
        top.call_void("bb.mid", Vec::new());
        top.ret(None);
    }
    let module = mb.build();
    let (ctx, _) = run(&module, &[seed(&module, "bb.sink", ArgPosition::Argument(1), "rdi")]);

    assert!(ctx.is_marked(id(&module, "bb.mid")));
    assert!(!ctx.is_input_function(id(&module, "bb.mid")));
    assert!(!ctx.is_marked(id(&module, "bb.top")));
}

#[test]
fn recursion_stays_within_bound() {
    let mut mb = ModuleBuilder::new("rec");
    {
        let mut leaf = mb.function("leaf");
        leaf.arg("x");
        leaf.ret(None);
    }
    {
        let mut r = mb.function("rec");
        let a = r.arg("n");
        r.call_void("leaf", vec![a]);
        r.call_void("rec", vec![a]);
        r.ret(None);
    }
    let module = mb.build();
    let (ctx, rounds) = run(&module, &[seed(&module, "leaf", ArgPosition::Argument(1), "x")]);
    assert!(ctx.is_marked(id(&module, "rec")));
    assert!(rounds >= 1);
}

#[test]
fn no_seeds_means_no_rounds() {
    let module = linear_chain(false);
    let (ctx, rounds) = run(&module, &[]);
    assert_eq!(rounds, 0);
    assert_eq!(ctx.marked_functions().count(), 0);
}
