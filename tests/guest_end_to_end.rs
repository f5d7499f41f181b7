//! End-to-end tests that run real guest WASM modules (built from WAT at
//! test time via the `wat` crate) through [`Wrapper`]/[`Engine`] against a
//! real [`InMemoryState`], rather than stubbing the host ABI away. Each
//! guest is a minimal bump-allocator module exporting `memory`, `malloc`,
//! `free` and `thunderchain_main`, matching the shape `Engine::run` expects.

use thunderchain_engine::prelude::*;
use std::sync::Arc;

fn ctx() -> ExecutionContext {
    ExecutionContext::new(Address::ZERO, 1, 0, 1_000_000, Address::ZERO, BigInt::from(0), 1)
}

fn wrapper(state: Arc<InMemoryState>) -> Wrapper {
    Wrapper::new(state, Arc::new(Secp256k1Signer), Arc::new(ModuleCache::new()), EngineConfig::default())
}

/// Shared bump allocator + `free` stub every guest module below reuses;
/// substituted into each module's text via `{alloc}`.
const ALLOC: &str = r#"
  (global $heap (mut i32) (i32.const 1024))
  (func (export "malloc") (param $size i32) (result i32)
    (local $p i32)
    (local.set $p (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $size)))
    (local.get $p))
  (func (export "free") (param $p i32))
"#;

/// Responds `"ok"` to the `Init` action (the create-time constructor call)
/// and echoes its `args` back verbatim for everything else, by comparing
/// the action string against `"Init"` with the imported `strcmp`.
fn echo_module_wat() -> String {
    format!(
        r#"
        (module
          (import "env" "strcmp" (func $strcmp (param i32 i32) (result i32)))
          (memory (export "memory") 2)
          (data (i32.const 8) "Init\00")
          (data (i32.const 16) "ok\00")
          {alloc}
          (func (export "thunderchain_main") (param $action_ptr i32) (param $args_ptr i32) (result i32)
            (if (result i32)
              (i32.eqz (call $strcmp (local.get $action_ptr) (i32.const 8)))
              (then (i32.const 16))
              (else (local.get $args_ptr)))))
        "#,
        alloc = ALLOC
    )
}

/// Always reverts with the fixed message `"no"`, regardless of action/args.
fn revert_module_wat() -> String {
    format!(
        r#"
        (module
          (import "env" "TC_RevertWithMsg" (func $revert (param i32)))
          (memory (export "memory") 1)
          (data (i32.const 8) "no\00")
          {alloc}
          (func (export "thunderchain_main") (param i32 i32) (result i32)
            (call $revert (i32.const 8))
            (i32.const 0)))
        "#,
        alloc = ALLOC
    )
}

/// Self-destructs to a fixed beneficiary address baked into the module's
/// data segment.
fn self_destruct_module_wat(beneficiary_hex: &str) -> String {
    format!(
        r#"
        (module
          (import "env" "TC_SelfDestruct" (func $selfdestruct (param i32)))
          (memory (export "memory") 1)
          (data (i32.const 8) "{beneficiary}\00")
          {alloc}
          (func (export "thunderchain_main") (param i32 i32) (result i32)
            (call $selfdestruct (i32.const 8))
            (i32.const 0)))
        "#,
        beneficiary = beneficiary_hex,
        alloc = ALLOC
    )
}

/// Unconditionally calls back into its own address via `TC_CallContract`,
/// which must be rejected as direct self-recursion before it ever enters a
/// second `entry.call`.
fn self_recursion_module_wat() -> String {
    format!(
        r#"
        (module
          (import "env" "TC_GetSelfAddress" (func $self_addr (result i32)))
          (import "env" "TC_CallContract" (func $call_contract (param i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (data (i32.const 8) "recurse|{{}}\00")
          (data (i32.const 32) "100000\00")
          {alloc}
          (func (export "thunderchain_main") (param i32 i32) (result i32)
            (call $call_contract (call $self_addr) (i32.const 8) (i32.const 32))))
        "#,
        alloc = ALLOC
    )
}

/// Writes a storage slot, then calls `exit(42)` unconditionally, so a
/// non-reverted `exit` call can be told apart from a reverted one by
/// checking whether the write stuck.
fn exit_module_wat() -> String {
    format!(
        r#"
        (module
          (import "env" "TC_StorageSet" (func $storage_set (param i32 i32)))
          (import "env" "exit" (func $exit (param i32)))
          (memory (export "memory") 2)
          (data (i32.const 8) "counter\00")
          (data (i32.const 32) "7\00")
          {alloc}
          (func (export "thunderchain_main") (param i32 i32) (result i32)
            (call $storage_set (i32.const 8) (i32.const 32))
            (call $exit (i32.const 42))
            (i32.const 0)))
        "#,
        alloc = ALLOC
    )
}

/// Stores one key/value pair so a non-trivial, rate-sensitive amount of gas
/// is actually charged before returning.
fn storage_write_module_wat() -> String {
    format!(
        r#"
        (module
          (import "env" "TC_StorageSet" (func $storage_set (param i32 i32)))
          (memory (export "memory") 2)
          (data (i32.const 8) "counter\00")
          (data (i32.const 32) "123456\00")
          {alloc}
          (func (export "thunderchain_main") (param i32 i32) (result i32)
            (call $storage_set (i32.const 8) (i32.const 32))
            (i32.const 0)))
        "#,
        alloc = ALLOC
    )
}

fn wat_to_wasm(text: &str) -> Vec<u8> {
    wat::parse_str(text).expect("valid WAT fixture")
}

#[tokio::test]
async fn create_then_call_echoes_args_back() {
    let state = Arc::new(InMemoryState::new());
    let w = wrapper(state.clone());
    let caller = Address::new([7u8; 20]);
    let code = wat_to_wasm(&echo_module_wat());

    let (address, init_output, _gas) = w
        .create(ctx(), caller, BigInt::from(0), 1_000_000, code, b"Init|{}", 0)
        .await
        .expect("create succeeds");
    assert_eq!(init_output, b"ok");

    let (output, consumed) = w
        .call(ctx(), caller, address, BigInt::from(0), 1_000_000, b"ping|{\"x\":1}", 0)
        .await
        .expect("call succeeds");
    assert_eq!(output, b"{\"x\":1}");
    assert!(consumed > 0);
}

#[tokio::test]
async fn revert_preserves_gas_and_rolls_back_state() {
    let state = Arc::new(InMemoryState::new());
    let w = wrapper(state.clone());
    let caller = Address::new([8u8; 20]);
    let to = Address::new([9u8; 20]);
    let code = wat_to_wasm(&revert_module_wat());
    state.set_code(to, code.into()).await.unwrap();

    let gas = 500_000;
    let (err, consumed) = w
        .call(ctx(), caller, to, BigInt::from(0), gas, b"do|{}", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExecutionReverted(msg) if msg == "no"));
    // A revert consumes only what actually ran, leaving the rest refundable.
    assert!(consumed < gas);
}

#[tokio::test]
async fn non_revert_error_consumes_the_whole_budget() {
    let state = Arc::new(InMemoryState::new());
    let w = wrapper(state.clone());
    let caller = Address::new([1u8; 20]);
    let to = Address::new([2u8; 20]);
    // No code installed at `to`: a non-revert `ContractNoCode` error.
    let gas = 250_000;
    let (err, consumed) = w
        .call(ctx(), caller, to, BigInt::from(0), gas, b"do|{}", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ContractNoCode));
    assert_eq!(consumed, gas);
}

#[tokio::test]
async fn self_destruct_moves_balance_to_beneficiary_and_evicts_code() {
    let state = Arc::new(InMemoryState::new());
    let w = wrapper(state.clone());
    let caller = Address::new([3u8; 20]);
    let to = Address::new([4u8; 20]);
    let beneficiary = Address::new([5u8; 20]);

    let code = wat_to_wasm(&self_destruct_module_wat(&beneficiary.to_hex()));
    state.set_code(to, code.into()).await.unwrap();
    state.set_balance(to, BigInt::from(1_000)).await.unwrap();

    let (_output, _consumed) = w
        .call(ctx(), caller, to, BigInt::from(0), 500_000, b"die|{}", 0)
        .await
        .expect("self-destruct call succeeds");

    assert!(state.has_suicided(to).await.unwrap());
    assert_eq!(state.get_balance(beneficiary).await.unwrap(), BigInt::from(1_000));
    assert_eq!(state.get_balance(to).await.unwrap(), BigInt::from(0));
}

#[tokio::test]
async fn direct_self_recursion_is_rejected() {
    let state = Arc::new(InMemoryState::new());
    let w = wrapper(state.clone());
    let caller = Address::new([6u8; 20]);
    let to = Address::new([10u8; 20]);
    let code = wat_to_wasm(&self_recursion_module_wat());
    state.set_code(to, code.into()).await.unwrap();

    let (err, _consumed) = w
        .call(ctx(), caller, to, BigInt::from(0), 1_000_000, b"recurse|{}", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SelfRecursion));
}

#[tokio::test]
async fn exit_returns_the_status_code_as_a_non_error_and_preserves_state() {
    let state = Arc::new(InMemoryState::new());
    let w = wrapper(state.clone());
    let caller = Address::new([11u8; 20]);
    let to = Address::new([12u8; 20]);
    let code = wat_to_wasm(&exit_module_wat());
    state.set_code(to, code.into()).await.unwrap();

    let gas = 500_000;
    let (output, consumed) = w
        .call(ctx(), caller, to, BigInt::from(0), gas, b"do|{}", 0)
        .await
        .expect("exit is not an error");
    assert_eq!(output, b"42");
    // Gas is preserved (only the cost actually run is spent), not forfeited.
    assert!(consumed < gas);
    // No revert happened: the storage write made just before `exit` stuck.
    let key = StorageKey::new(*keccak256(b"counter").as_bytes());
    let mut expected = [0u8; 32];
    expected[31] = 7;
    assert_eq!(state.get_storage(to, key).await.unwrap().as_bytes(), &expected);
}

#[tokio::test]
async fn higher_wasm_gas_rate_scales_down_reported_consumption() {
    let state_rate_one = Arc::new(InMemoryState::new());
    let w_rate_one = wrapper(state_rate_one.clone());
    let caller = Address::new([13u8; 20]);
    let to_rate_one = Address::new([14u8; 20]);
    state_rate_one.set_code(to_rate_one, wat_to_wasm(&storage_write_module_wat()).into()).await.unwrap();

    let ctx_rate_one = ExecutionContext::new(Address::ZERO, 1, 0, 1_000_000, Address::ZERO, BigInt::from(0), 1);
    let (_output, consumed_rate_one) = w_rate_one
        .call(ctx_rate_one, caller, to_rate_one, BigInt::from(0), 1_000_000, b"do|{}", 0)
        .await
        .expect("call succeeds at rate 1");

    let state_rate_four = Arc::new(InMemoryState::new());
    let w_rate_four = wrapper(state_rate_four.clone());
    let to_rate_four = Address::new([15u8; 20]);
    state_rate_four.set_code(to_rate_four, wat_to_wasm(&storage_write_module_wat()).into()).await.unwrap();

    let ctx_rate_four = ExecutionContext::new(Address::ZERO, 1, 0, 1_000_000, Address::ZERO, BigInt::from(0), 4);
    let (_output, consumed_rate_four) = w_rate_four
        .call(ctx_rate_four, caller, to_rate_four, BigInt::from(0), 1_000_000, b"do|{}", 0)
        .await
        .expect("call succeeds at rate 4");

    // Same guest work charges the same number of internal (guest-scaled)
    // gas units regardless of rate; descaling to native units at a higher
    // rate divides that figure down accordingly.
    assert!(consumed_rate_four > 0);
    assert!(consumed_rate_four < consumed_rate_one);
    assert_eq!(consumed_rate_four, consumed_rate_one.div_ceil(4));
}
