//! Direct host execution of the reference kernels, no fallback involved.

use hostfall::{DispatchKey, Dispatcher, Stack, Tensor, Value};
use hostfall::{Device, DispatchError, KernelError};

fn host_dispatcher() -> Dispatcher {
    let dispatcher = Dispatcher::new();
    hostfall_ref_host::install(&dispatcher);
    dispatcher
}

fn host(data: Vec<f32>) -> Tensor {
    let len = data.len();
    Tensor::from_vec(Device::Host, vec![len], data).unwrap()
}

#[test]
fn add_and_mul_compute_elementwise() {
    let dispatcher = host_dispatcher();
    let mut stack = Stack::new();
    stack.push(host(vec![1.0, 2.0]));
    stack.push(host(vec![3.0, 4.0]));
    dispatcher.call("add", &DispatchKey::Host, &mut stack).unwrap();
    assert_eq!(stack.get(0).as_tensor().unwrap().to_vec(), vec![4.0, 6.0]);

    let mut stack = Stack::new();
    stack.push(host(vec![2.0, 3.0]));
    stack.push(host(vec![4.0, 5.0]));
    dispatcher.call("mul", &DispatchKey::Host, &mut stack).unwrap();
    assert_eq!(stack.get(0).as_tensor().unwrap().to_vec(), vec![8.0, 15.0]);
}

#[test]
fn inplace_add_mutates_and_returns_its_input() {
    let dispatcher = host_dispatcher();
    let a = host(vec![1.0, 1.0]);
    let mut stack = Stack::new();
    stack.push(a.clone());
    stack.push(host(vec![5.0, 6.0]));
    dispatcher.call("add_", &DispatchKey::Host, &mut stack).unwrap();
    let returned = stack.get(0).as_tensor().unwrap();
    assert!(returned.same_identity(&a));
    assert_eq!(a.to_vec(), vec![6.0, 7.0]);
}

#[test]
fn fill_takes_a_scalar_and_leaves_no_returns() {
    let dispatcher = host_dispatcher();
    let a = host(vec![1.0, 2.0, 3.0]);
    let mut stack = Stack::new();
    stack.push(a.clone());
    stack.push(Value::Float(0.5));
    dispatcher.call("fill_", &DispatchKey::Host, &mut stack).unwrap();
    assert!(stack.is_empty());
    assert_eq!(a.to_vec(), vec![0.5, 0.5, 0.5]);
}

#[test]
fn view_as_shares_storage_when_shapes_agree() {
    let dispatcher = host_dispatcher();
    let a = host(vec![1.0, 2.0]);
    let mut stack = Stack::new();
    stack.push(a.clone());
    stack.push(host(vec![0.0, 0.0]));
    dispatcher.call("view_as", &DispatchKey::Host, &mut stack).unwrap();
    let returned = stack.get(0).as_tensor().unwrap();
    // On the host a same-shape view really is a view.
    assert!(returned.same_storage(&a));
}

#[test]
fn view_as_reshapes_a_copy_when_shapes_differ() {
    let dispatcher = host_dispatcher();
    let a = host(vec![1.0, 2.0, 3.0, 4.0]);
    let donor = Tensor::zeros(Device::Host, vec![2, 2]);
    let mut stack = Stack::new();
    stack.push(a.clone());
    stack.push(donor);
    dispatcher.call("view_as", &DispatchKey::Host, &mut stack).unwrap();
    let returned = stack.get(0).as_tensor().unwrap();
    assert_eq!(returned.shape(), vec![2, 2]);
    assert_eq!(returned.to_vec(), a.to_vec());
    assert!(!returned.same_storage(&a));
}

#[test]
fn view_as_rejects_element_count_mismatch() {
    let dispatcher = host_dispatcher();
    let mut stack = Stack::new();
    stack.push(host(vec![1.0, 2.0, 3.0]));
    stack.push(host(vec![0.0, 0.0]));
    let err = dispatcher
        .call("view_as", &DispatchKey::Host, &mut stack)
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Kernel(KernelError::Execution { .. })
    ));
}

#[test]
fn sum_list_skips_undefined_entries() {
    let dispatcher = host_dispatcher();
    let mut stack = Stack::new();
    stack.push(host(vec![1.0, 1.0]));
    stack.push(Value::TensorList(vec![
        Some(host(vec![2.0, 2.0])),
        None,
        Some(host(vec![3.0, 3.0])),
    ]));
    dispatcher.call("sum_list", &DispatchKey::Host, &mut stack).unwrap();
    assert_eq!(stack.get(0).as_tensor().unwrap().to_vec(), vec![6.0, 6.0]);
}

#[test]
fn binary_ops_reject_shape_mismatch() {
    let dispatcher = host_dispatcher();
    let mut stack = Stack::new();
    stack.push(host(vec![1.0, 2.0]));
    stack.push(host(vec![1.0, 2.0, 3.0]));
    let err = dispatcher.call("add", &DispatchKey::Host, &mut stack).unwrap_err();
    assert!(err.to_string().contains("shape mismatch"));
}
