#![allow(dead_code)]

use wasm_poll_bridge::wasmtime::Engine;
use wasm_poll_bridge::{Api, ApiBuilder};

/// A module speaking the poll protocol.
///
/// Async exports keep their state in globals, so only one future and one
/// stream of each kind may be in flight per instance. `polls`, `drops`,
/// `deallocs` and `dealloc_size` let tests observe host-side behavior.
pub const MODULE: &str = r#"
(module
  (import "env" "__notifier_callback" (func $notify (param i32)))
  (import "env" "__log" (func $log (param i32 i32)))
  (import "env" "__panic" (func $panic (param i32 i32)))

  (memory (export "memory") 1)
  (data (i32.const 16) "boom")
  (data (i32.const 32) "hello world")
  (data (i32.const 48) "explode")

  (global $heap (mut i32) (i32.const 1024))
  (global $polls (mut i32) (i32.const 0))
  (global $drops (mut i32) (i32.const 0))
  (global $deallocs (mut i32) (i32.const 0))
  (global $dealloc_size (mut i32) (i32.const 0))
  (global $remaining (mut i32) (i32.const 0))
  (global $later_ready (mut i32) (i32.const 0))
  (global $later_slot (mut i32) (i32.const -1))
  (global $count_next (mut i32) (i32.const 0))
  (global $count_limit (mut i32) (i32.const 0))

  (func $allocate (export "allocate") (param $size i32) (param $align i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap
      (i32.and
        (i32.add (i32.add (global.get $heap) (local.get $size)) (i32.const 7))
        (i32.const -8)))
    (local.get $ptr))

  (func (export "deallocate") (param $ptr i32) (param $size i32) (param $align i32)
    (global.set $deallocs (i32.add (global.get $deallocs) (i32.const 1)))
    (global.set $dealloc_size (local.get $size)))

  (func (export "polls") (result i32) (global.get $polls))
  (func (export "drops") (result i32) (global.get $drops))
  (func (export "deallocs") (result i32) (global.get $deallocs))
  (func (export "dealloc_size") (result i32) (global.get $dealloc_size))

  (func $count_poll
    (global.set $polls (i32.add (global.get $polls) (i32.const 1))))
  (func $count_drop
    (global.set $drops (i32.add (global.get $drops) (i32.const 1))))

  ;; Pending `n` times, waking its slot each time, then ready with 42.
  (func (export "__answer") (param $n i32) (result i32)
    (global.set $remaining (local.get $n))
    (i32.const 0x100))
  (func (export "__answer_future_poll") (param $handle i32) (param $flags i32) (param $slot i64)
    (result i32 i32 i32 i32 i32 i32)
    (call $count_poll)
    (if (i32.gt_s (global.get $remaining) (i32.const 0))
      (then
        (global.set $remaining (i32.sub (global.get $remaining) (i32.const 1)))
        (call $notify (i32.wrap_i64 (local.get $slot)))
        (return (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0))))
    (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 42))
  (func (export "__answer_future_drop") (param $flags i32) (param $handle i32)
    (call $count_drop))

  ;; Fails with "boom" in a freshly allocated buffer of capacity 8.
  (func (export "__fail") (result i32) (i32.const 0x200))
  (func (export "__fail_future_poll") (param $handle i32) (param $flags i32) (param $slot i64)
    (result i32 i32 i32 i32 i32 i32)
    (local $ptr i32)
    (call $count_poll)
    (local.set $ptr (call $allocate (i32.const 8) (i32.const 1)))
    (memory.copy (local.get $ptr) (i32.const 16) (i32.const 4))
    (i32.const 0) (i32.const 1) (local.get $ptr) (i32.const 4) (i32.const 8) (i32.const 0))
  (func (export "__fail_future_drop") (param $flags i32) (param $handle i32)
    (call $count_drop))

  ;; Fails with an empty message and no allocation.
  (func (export "__fail_empty") (result i32) (i32.const 0x300))
  (func (export "__fail_empty_future_poll") (param $handle i32) (param $flags i32) (param $slot i64)
    (result i32 i32 i32 i32 i32 i32)
    (call $count_poll)
    (i32.const 0) (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0))
  (func (export "__fail_empty_future_drop") (param $flags i32) (param $handle i32)
    (call $count_drop))

  ;; Stays pending until the host calls `fire`, then ready with 7.
  (func (export "__later") (result i32)
    (global.set $later_ready (i32.const 0))
    (i32.const 0x400))
  (func (export "__later_future_poll") (param $handle i32) (param $flags i32) (param $slot i64)
    (result i32 i32 i32 i32 i32 i32)
    (call $count_poll)
    (if (i32.eqz (global.get $later_ready))
      (then
        (global.set $later_slot (i32.wrap_i64 (local.get $slot)))
        (return (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0))))
    (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 7))
  (func (export "__later_future_drop") (param $flags i32) (param $handle i32)
    (call $count_drop))
  (func (export "fire")
    (global.set $later_ready (i32.const 1))
    (call $notify (global.get $later_slot)))

  ;; Panics through the host import on first poll.
  (func (export "__explode") (result i32) (i32.const 0x500))
  (func (export "__explode_future_poll") (param $handle i32) (param $flags i32) (param $slot i64)
    (result i32 i32 i32 i32 i32 i32)
    (call $count_poll)
    (call $panic (i32.const 48) (i32.const 7))
    (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0) (i32.const 0))
  (func (export "__explode_future_drop") (param $flags i32) (param $handle i32)
    (call $count_drop))

  ;; Yields 1..=n, waking `next` after each item and `done` once exhausted.
  (func (export "__count") (param $n i32) (result i32)
    (global.set $count_next (i32.const 0))
    (global.set $count_limit (local.get $n))
    (i32.const 0x600))
  (func (export "__count_stream_poll") (param $handle i32) (param $flags i32) (param $next i64) (param $done i64)
    (result i32 i32)
    (call $count_poll)
    (if (i32.lt_s (global.get $count_next) (global.get $count_limit))
      (then
        (global.set $count_next (i32.add (global.get $count_next) (i32.const 1)))
        (call $notify (i32.wrap_i64 (local.get $next)))
        (return (i32.const 1) (global.get $count_next))))
    (call $notify (i32.wrap_i64 (local.get $done)))
    (i32.const 0) (i32.const 0))
  (func (export "__count_stream_drop") (param $flags i32) (param $handle i32)
    (call $count_drop))

  (func (export "hello")
    (call $log (i32.const 32) (i32.const 11)))
)
"#;

pub fn engine() -> Engine {
    Engine::default()
}

pub fn instantiate() -> Api {
    ApiBuilder::new(&engine()).instantiate(MODULE).unwrap()
}

/// Reads one of the module's counter exports.
pub fn counter(api: &Api, name: &str) -> i32 {
    api.call::<(), i32>(name, ()).unwrap()
}
