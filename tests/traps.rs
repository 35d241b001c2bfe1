use wrun::{Engine, HostError, Instance, Module, Trap};

fn instantiate(wat: &str) -> Instance {
    let engine = Engine::default();
    let module = Module::new(&engine, wat).unwrap();
    Instance::new(&module).unwrap()
}

fn expect_trap(result: Result<Vec<wrun::Val>, HostError>, want: Trap) {
    match result {
        Err(HostError::Trap(trap)) => assert_eq!(trap, want),
        other => panic!("expected trap {want:?}, got {other:?}"),
    }
}

#[test]
fn unreachable_traps() {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "boom")
                unreachable
            )
        )
    "#,
    );
    expect_trap(instance.call_dynamic("boom", &[]), Trap::Unreachable);
}

#[test]
fn divide_by_zero_traps() {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s
            )
        )
    "#,
    );
    expect_trap(
        instance.call_dynamic("div", &[wrun::Val::I32(1), wrun::Val::I32(0)]),
        Trap::DivideByZero,
    );
    // A valid divisor still works on the same handle.
    let vals = instance
        .call_dynamic("div", &[wrun::Val::I32(7), wrun::Val::I32(2)])
        .unwrap();
    assert_eq!(vals, vec![wrun::Val::I32(3)]);
}

#[test]
fn signed_division_overflow_traps() {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s
            )
        )
    "#,
    );
    expect_trap(
        instance.call_dynamic("div", &[wrun::Val::I32(i32::MIN), wrun::Val::I32(-1)]),
        Trap::IntegerOverflow,
    );
}

#[test]
fn min_rem_negative_one_is_zero_not_a_trap() {
    let mut instance = instantiate(
        r#"
        (module
            (func (export "rem") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.rem_s
            )
        )
    "#,
    );
    let vals = instance
        .call_dynamic("rem", &[wrun::Val::I32(i32::MIN), wrun::Val::I32(-1)])
        .unwrap();
    assert_eq!(vals, vec![wrun::Val::I32(0)]);
}

#[test]
fn out_of_bounds_load_traps() {
    let mut instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "peek") (param i32) (result i32)
                local.get 0
                i32.load
            )
        )
    "#,
    );
    // One page is 65536 bytes; a 4-byte load at 65533 crosses the end.
    expect_trap(
        instance.call_dynamic("peek", &[wrun::Val::I32(65533)]),
        Trap::OutOfBoundsMemoryAccess,
    );
    let vals = instance
        .call_dynamic("peek", &[wrun::Val::I32(65532)])
        .unwrap();
    assert_eq!(vals, vec![wrun::Val::I32(0)]);
}

#[test]
fn runaway_recursion_exhausts_the_call_stack() {
    let mut instance = instantiate(
        r#"
        (module
            (func $spin (export "spin")
                call $spin
            )
        )
    "#,
    );
    expect_trap(instance.call_dynamic("spin", &[]), Trap::CallStackExhausted);
}

#[test]
fn trap_messages_use_canonical_phrasing() {
    assert_eq!(Trap::Unreachable.to_string(), "unreachable executed");
    assert_eq!(Trap::DivideByZero.to_string(), "integer divide by zero");
    assert_eq!(Trap::IntegerOverflow.to_string(), "integer overflow");
    assert_eq!(
        Trap::OutOfBoundsMemoryAccess.to_string(),
        "out of bounds memory access"
    );
    assert_eq!(Trap::CallStackExhausted.to_string(), "call stack exhausted");
}
