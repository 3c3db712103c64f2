use super::*;
use crate::config::Options;
use crate::error::ErrorKind;
use crate::instrument::Unwind;
use crate::vm::value::{Stateful, Value};
use crate::vm::Interpreter;
use maplit::btreemap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

/// Pins the closure to the higher-ranked session signature
fn manager<F>(f: F) -> F
where
    F: for<'a> Fn(ReplSession<'a>) -> Result<Infallible, Unwind> + Send + Sync,
{
    f
}

fn debugging(server: Arc<DebugServer>) -> Interpreter {
    Interpreter::builder()
        .options(Options::default().repl_debugger(true))
        .debug_server(server)
        .build()
}

fn run(interpreter: &Interpreter, source: &str, state: Value) -> Stateful {
    interpreter.run_source(source, "test.tala", state).unwrap()
}

#[test]
fn exit_resumes_with_last_evaluated_value() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        assert_eq!(session.evaluate("1 + 1").unwrap(), Value::Integer(2));
        session.exit()
    }));
    let interpreter = debugging(server);
    let result = run(&interpreter, "let x = breakpoint()\nx", Value::Nothing);
    assert_eq!(result.value, Value::Integer(2));
}

#[test]
fn immediate_exit_resumes_with_nothing() {
    let server = DebugServer::with_manager(manager(|session: ReplSession<'_>| session.exit()));
    let interpreter = debugging(server);
    let result = run(&interpreter, "let x = breakpoint()\nx", Value::Nothing);
    assert_eq!(result.value, Value::Nothing);
}

#[test]
fn failed_evaluation_leaves_state_untouched() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        session.evaluate("let a = 5").unwrap();
        let before = session.state().clone();
        let err = session.evaluate("missing + 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameError);
        assert_eq!(session.state(), &before);

        let err = session.evaluate("1 +").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(session.state(), &before);
        session.exit()
    }));
    let interpreter = debugging(server);
    run(&interpreter, "breakpoint()", Value::Nothing);
}

#[test]
fn bindings_show_the_innermost_shadow() {
    let seen = Arc::new(Mutex::new(BTreeMap::new()));
    let sink = seen.clone();
    let server = DebugServer::with_manager(manager(move |session: ReplSession<'_>| {
        *sink.lock() = session.list_bindings();
        session.exit()
    }));
    let interpreter = debugging(server);
    run(
        &interpreter,
        "let x = 1\nlet f = fn() { let x = 2\n breakpoint() }\nf()",
        Value::Nothing,
    );

    let seen = seen.lock();
    assert_eq!(seen.get("x"), Some(&Value::Integer(2)));
    assert!(matches!(seen.get("f"), Some(Value::Function(_))));
}

#[test]
fn bindings_skip_names_not_yet_assigned() {
    let seen = Arc::new(Mutex::new(BTreeMap::new()));
    let sink = seen.clone();
    let server = DebugServer::with_manager(manager(move |session: ReplSession<'_>| {
        *sink.lock() = session.list_bindings();
        session.exit()
    }));
    let interpreter = debugging(server);
    run(&interpreter, "let a = 1\nbreakpoint()\nlet b = 2", Value::Nothing);

    let seen = seen.lock();
    assert_eq!(seen.get("a"), Some(&Value::Integer(1)));
    assert!(!seen.contains_key("b"));
}

#[test]
fn let_in_one_evaluation_is_visible_to_the_next() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        session.evaluate("let y = x * 10").unwrap();
        assert_eq!(session.evaluate("y + 2").unwrap(), Value::Integer(42));
        assert_eq!(
            session.list_bindings().get("y"),
            Some(&Value::Integer(40))
        );
        session.exit()
    }));
    let interpreter = debugging(server);
    let result = run(&interpreter, "let x = 4\nlet r = breakpoint()\nr", Value::Nothing);
    assert_eq!(result.value, Value::Integer(42));
}

#[test]
fn evaluations_thread_the_state_token() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        assert_eq!(session.evaluate("put_state(7)").unwrap(), Value::Integer(1));
        assert_eq!(session.state().last_state, Value::Integer(7));
        session.exit()
    }));
    let interpreter = debugging(server);
    let result = run(&interpreter, "breakpoint()\nget_state() + 1", Value::Integer(1));
    assert_eq!(result.state, Value::Integer(7));
    assert_eq!(result.value, Value::Integer(8));
}

#[test]
fn evaluations_count_against_the_depth_of_the_halt() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        assert_eq!(session.evaluate("g(1)").unwrap(), Value::Integer(0));
        let err = session.evaluate("g(2)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RuntimeError);
        assert!(err.message.contains("Stack overflow"));
        session.exit()
    }));
    let interpreter = Interpreter::builder()
        .options(Options::default().repl_debugger(true).max_call_depth(8))
        .debug_server(server)
        .build();
    let source = "let g = fn(n) { if n == 0 { 0 } else { g(n - 1) } }\n\
                  let f = fn(n) { if n == 0 { breakpoint() } else { f(n - 1) } }\n\
                  f(5)\n\
                  g(7)";
    assert_eq!(run(&interpreter, source, Value::Nothing).value, Value::Integer(0));
}

#[test]
fn halts_resume_without_a_client() {
    let interpreter = debugging(DebugServer::detached());
    let source = "let x = breakpoint()\nlet y = breakpoint()\n[x, y]";
    let result = run(&interpreter, source, Value::Nothing);
    assert_eq!(result.value, Value::array(vec![Value::Nothing, Value::Nothing]));
}

#[test]
fn vetoed_and_detached_transports_start_without_client() {
    let vetoed = DebugServer::start(&ChannelTransport::vetoed("sandboxed")).unwrap();
    assert!(!vetoed.has_client());
    let detached = DebugServer::start(&ChannelTransport::detached()).unwrap();
    assert!(!detached.has_client());
    let unreachable = DebugServer::start(&TcpTransport::new("not an address")).unwrap();
    assert!(!unreachable.has_client());

    let interpreter = debugging(vetoed);
    assert_eq!(run(&interpreter, "breakpoint()\n3", Value::Nothing).value, Value::Integer(3));
}

#[test]
fn shutdown_detaches_the_client() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        session.evaluate("99").unwrap();
        session.exit()
    }));
    let interpreter = debugging(server.clone());
    assert_eq!(run(&interpreter, "breakpoint()", Value::Nothing).value, Value::Integer(99));

    server.shutdown();
    assert!(!server.has_client());
    assert_eq!(run(&interpreter, "breakpoint()", Value::Nothing).value, Value::Nothing);
}

#[test]
fn disabled_debugger_ignores_the_server() {
    let server = DebugServer::with_manager(manager(|_: ReplSession<'_>| {
        panic!("session must not start")
    }));
    let interpreter = Interpreter::builder().debug_server(server).build();
    assert!(interpreter.debug_server().is_none());
    assert_eq!(run(&interpreter, "breakpoint()\n1", Value::Nothing).value, Value::Integer(1));
}

#[test]
fn each_halt_gets_its_own_session() {
    let ids = Arc::new(Mutex::new(Vec::new()));
    let sink = ids.clone();
    let server = DebugServer::with_manager(manager(move |session: ReplSession<'_>| {
        sink.lock().push(session.id());
        session.exit()
    }));
    let interpreter = debugging(server);
    run(&interpreter, "let f = fn() { breakpoint() }\nf()\nf()", Value::Nothing);

    let ids = ids.lock();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn threads_halt_independently() {
    let server = DebugServer::with_manager(manager(|mut session: ReplSession<'_>| {
        session.evaluate("get_state() * 10").unwrap();
        session.exit()
    }));
    let interpreter = debugging(server);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let interpreter = &interpreter;
                scope.spawn(move || {
                    run(interpreter, "let r = breakpoint()\nr", Value::Integer(n)).value
                })
            })
            .collect();
        for (n, handle) in (1..=4).zip(handles) {
            assert_eq!(handle.join().unwrap(), Value::Integer(n * 10));
        }
    });
}

#[test]
fn remote_client_drives_a_session_over_the_wire() {
    let (transport, client_end) = ChannelTransport::connected();
    let server = DebugServer::start(&transport).unwrap();
    assert!(server.has_client());
    let interpreter = debugging(server);

    let client = std::thread::spawn(move || {
        let client = DebugClient::new(client_end);
        let info = client.wait_session().unwrap();
        assert_eq!(info.file, "test.tala");
        assert_eq!(info.line, 2);

        // `y` is not assigned until the halt resumes
        let bindings = client.list_bindings(info.id).unwrap();
        assert_eq!(bindings, btreemap! { "x".to_string() => "21".to_string() });

        let handle = match client.evaluate(info.id, "x * 2").unwrap() {
            Evaluation::Success { result, handle } => {
                assert_eq!(result, "42");
                handle
            }
            other => panic!("unexpected {:?}", other),
        };
        match client.evaluate(info.id, "nope").unwrap() {
            Evaluation::Failure { error, .. } => assert!(error.contains("nope")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(client.show_object(info.id, handle).unwrap(), Ok("42".to_string()));
        assert!(client.show_object(info.id, 17).unwrap().is_err());
        client.exit(info.id).unwrap();
    });

    let result = run(&interpreter, "let x = 21\nlet y = breakpoint()\ny", Value::Nothing);
    client.join().unwrap();
    assert_eq!(result.value, Value::Integer(42));
}

#[test]
fn one_connection_serves_concurrent_sessions() {
    let (transport, client_end) = ChannelTransport::connected();
    let interpreter = debugging(DebugServer::start(&transport).unwrap());

    let client = std::thread::spawn(move || {
        let client = DebugClient::new(client_end);
        let first = client.wait_session().unwrap();
        let second = client.wait_session().unwrap();
        assert_ne!(first.id, second.id);
        // Answer the later session first
        for info in [second, first] {
            assert!(matches!(
                client.evaluate(info.id, "get_state() * 10").unwrap(),
                Evaluation::Success { .. }
            ));
            client.exit(info.id).unwrap();
        }
    });

    std::thread::scope(|scope| {
        let handles: Vec<_> = [1, 2]
            .into_iter()
            .map(|n| {
                let interpreter = &interpreter;
                scope.spawn(move || {
                    run(interpreter, "let r = breakpoint()\nr", Value::Integer(n)).value
                })
            })
            .collect();
        for (n, handle) in [1, 2].into_iter().zip(handles) {
            assert_eq!(handle.join().unwrap(), Value::Integer(n * 10));
        }
    });
    client.join().unwrap();
}

#[test]
fn replies_reach_callers_while_another_waits_for_a_session() {
    let (transport, client_end) = ChannelTransport::connected();
    let interpreter = debugging(DebugServer::start(&transport).unwrap());

    let client = std::thread::spawn(move || {
        let client = DebugClient::new(client_end);
        let first = client.wait_session().unwrap();
        std::thread::scope(|scope| {
            // Blocks on the wire until the second halt, which needs the first to exit
            let waiter = scope.spawn(|| client.wait_session().unwrap());
            std::thread::sleep(std::time::Duration::from_millis(50));

            assert!(matches!(
                client.evaluate(first.id, "1 + 1").unwrap(),
                Evaluation::Success { ref result, .. } if result == "2"
            ));
            client.exit(first.id).unwrap();

            let second = waiter.join().unwrap();
            assert_ne!(second.id, first.id);
            client.evaluate(second.id, "3").unwrap();
            client.exit(second.id).unwrap();
        });
    });

    let source = "let a = breakpoint()\nlet b = breakpoint()\n[a, b]";
    let result = run(&interpreter, source, Value::Nothing);
    client.join().unwrap();
    assert_eq!(
        result.value,
        Value::array(vec![Value::Integer(2), Value::Integer(3)])
    );
}

#[test]
fn lost_connection_resumes_the_program() {
    let (transport, client_end) = ChannelTransport::connected();
    let interpreter = debugging(DebugServer::start(&transport).unwrap());
    drop(client_end);
    assert_eq!(run(&interpreter, "breakpoint()\n5", Value::Nothing).value, Value::Integer(5));
}
