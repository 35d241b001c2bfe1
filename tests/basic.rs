use wrun::{Engine, HostError, Instance, Module, Val};

fn instantiate(wat: &str) -> Instance {
    let engine = Engine::default();
    let module = Module::new(&engine, wat).unwrap();
    Instance::new(&module).unwrap()
}

const ADD: &str = r#"
    (module
        (func (export "add") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.add
        )
    )
"#;

#[test]
fn return_const_i32() -> Result<(), HostError> {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "answer") (result i32)
                i32.const 42
            )
        )
    "#,
    );
    let result: (i32,) = instance.call("answer", ())?;
    assert_eq!(result, (42,));
    Ok(())
}

#[test]
fn add_returns_sum() -> Result<(), HostError> {
    let mut instance = instantiate(ADD);
    let result: (i32,) = instance.call("add", (24, 24))?;
    assert_eq!(result, (48,));
    Ok(())
}

#[test]
fn add_zero_negative_and_boundary_pairs() -> Result<(), HostError> {
    let mut instance = instantiate(ADD);
    let cases = [
        (0, 0, 0),
        (0, -1, -1),
        (-5, 3, -2),
        (i32::MAX, 0, i32::MAX),
        (i32::MIN, 0, i32::MIN),
        // i32.add wraps at the boundary.
        (i32::MAX, 1, i32::MIN),
        (i32::MIN, -1, i32::MAX),
    ];
    for (a, b, want) in cases {
        let (got,): (i32,) = instance.call("add", (a, b))?;
        assert_eq!(got, want, "add({a}, {b})");
    }
    Ok(())
}

#[test]
fn add_is_commutative() -> Result<(), HostError> {
    let mut instance = instantiate(ADD);
    for (a, b) in [(1, 2), (-7, 19), (i32::MAX, i32::MIN), (0, 123456)] {
        let (ab,): (i32,) = instance.call("add", (a, b))?;
        let (ba,): (i32,) = instance.call("add", (b, a))?;
        assert_eq!(ab, ba);
    }
    Ok(())
}

#[test]
fn call_dynamic_matches_typed_call() -> Result<(), HostError> {
    let mut instance = instantiate(ADD);
    let vals = instance.call_dynamic("add", &[Val::I32(24), Val::I32(24)])?;
    assert_eq!(vals, vec![Val::I32(48)]);
    Ok(())
}

#[test]
fn i64_and_f64_arithmetic() -> Result<(), HostError> {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "add64") (param i64 i64) (result i64)
                local.get 0
                local.get 1
                i64.add
            )
            (func (export "mulf") (param f64 f64) (result f64)
                local.get 0
                local.get 1
                f64.mul
            )
        )
    "#,
    );
    let (sum,): (i64,) = instance.call("add64", (1_i64 << 40, 1_i64))?;
    assert_eq!(sum, (1_i64 << 40) + 1);
    let (product,): (f64,) = instance.call("mulf", (1.5_f64, 4.0_f64))?;
    assert_eq!(product, 6.0);
    Ok(())
}

#[test]
fn multi_value_results() -> Result<(), HostError> {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "sum_and_diff") (param i32 i32) (result i32 i32)
                local.get 0
                local.get 1
                i32.add
                local.get 0
                local.get 1
                i32.sub
            )
        )
    "#,
    );
    let result: (i32, i32) = instance.call("sum_and_diff", (10, 4))?;
    assert_eq!(result, (14, 6));
    Ok(())
}

#[test]
fn control_flow_loop_and_branch() -> Result<(), HostError> {
    // Iterative sum 1..=n: exercises block, loop, br_if, locals.
    let mut instance = instantiate(
        r#"
        (module
            (func (export "sum_to") (param i32) (result i32)
                (local i32)
                block
                    loop
                        local.get 0
                        i32.eqz
                        br_if 1
                        local.get 1
                        local.get 0
                        i32.add
                        local.set 1
                        local.get 0
                        i32.const 1
                        i32.sub
                        local.set 0
                        br 0
                    end
                end
                local.get 1
            )
        )
    "#,
    );
    let (got,): (i32,) = instance.call("sum_to", (10,))?;
    assert_eq!(got, 55);
    Ok(())
}

#[test]
fn if_else_select_and_calls() -> Result<(), HostError> {
    let mut instance = instantiate(
        r#"
        (module
            (func $abs (param i32) (result i32)
                local.get 0
                i32.const 0
                i32.lt_s
                if (result i32)
                    i32.const 0
                    local.get 0
                    i32.sub
                else
                    local.get 0
                end
            )
            (func (export "absmax") (param i32 i32) (result i32)
                local.get 0
                call $abs
                local.get 1
                call $abs
                local.get 0
                call $abs
                local.get 1
                call $abs
                i32.gt_s
                select
            )
        )
    "#,
    );
    let (got,): (i32,) = instance.call("absmax", (-9, 4))?;
    assert_eq!(got, 9);
    let (got,): (i32,) = instance.call("absmax", (3, -12))?;
    assert_eq!(got, 12);
    Ok(())
}

#[test]
fn memory_and_globals() -> Result<(), HostError> {
    let mut instance = instantiate(
        r#"
        (module
            (memory 1)
            (data (i32.const 8) "\2a\00\00\00")
            (global $counter (mut i32) (i32.const 0))
            (func (export "read_data") (result i32)
                i32.const 8
                i32.load
            )
            (func (export "bump") (result i32)
                global.get $counter
                i32.const 1
                i32.add
                global.set $counter
                global.get $counter
            )
            (func (export "store_read") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.store
                local.get 0
                i32.load
            )
        )
    "#,
    );
    let (data,): (i32,) = instance.call("read_data", ())?;
    assert_eq!(data, 42);
    let (one,): (i32,) = instance.call("bump", ())?;
    let (two,): (i32,) = instance.call("bump", ())?;
    assert_eq!((one, two), (1, 2));
    let (roundtrip,): (i32,) = instance.call("store_read", (100, -7))?;
    assert_eq!(roundtrip, -7);
    Ok(())
}

#[test]
fn export_types_reports_signature() {
    let instance = instantiate(ADD);
    let (params, results) = instance.export_types("add").unwrap();
    assert_eq!(params, &[wrun::Ty::I32, wrun::Ty::I32]);
    assert_eq!(results, &[wrun::Ty::I32]);
}

#[test]
fn exports_are_listed_sorted() {
    let instance = instantiate(
        r#"
        (module
            (func (export "b") (result i32) i32.const 1)
            (func (export "a") (result i32) i32.const 2)
        )
    "#,
    );
    let names: Vec<&str> = instance
        .module()
        .exports()
        .iter()
        .map(|(name, ..)| *name)
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}
