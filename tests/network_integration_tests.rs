//! Network integration tests
//!
//! Real nodes on ephemeral localhost ports talking JACKIE and HTTP to each
//! other, the same way separate processes would.

use jackie_chain::{Config, NodeService, Server, Wallet};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

fn start_node(id: &str, join: Option<u16>, miner: Option<&str>) -> (NodeService, u16) {
    let mut config = Config::new();
    config.set_node_id(id.to_string());
    config.set_port(0);
    config.set_difficulty(1);
    config.set_reward(50);
    if let Some(miner) = miner {
        config.set_mining_addr(miner.to_string());
    }

    let server = Server::bind(config).unwrap();
    let port = server.local_addr().unwrap().port();
    let node = server.node().clone();

    match join {
        Some(port) => node.join(&format!("127.0.0.1:{port}")).unwrap(),
        None => {
            node.seed_chain().unwrap();
        }
    }
    thread::spawn(move || server.serve());
    (node, port)
}

fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    false
}

fn knows(node: &NodeService, id: &str) -> bool {
    node.read_state(|s| s.peers.contains(id)).unwrap()
}

fn http(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn json_body(response: &str) -> serde_json::Value {
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

#[test]
fn test_connect_and_disconnect() {
    let (b, b_port) = start_node("node-b", None, None);
    let (a, _) = start_node("node-a", Some(b_port), None);

    assert!(eventually(|| knows(&b, "node-a")));
    assert!(eventually(|| knows(&a, "node-b")));

    a.terminate().unwrap();

    assert!(eventually(|| !knows(&b, "node-a")));
    assert!(knows(&a, "node-b"));
}

#[test]
fn test_joining_node_downloads_chain() {
    let (b, b_port) = start_node("origin", None, Some("miner"));
    b.mine_tick().unwrap();
    let (a, _) = start_node("newcomer", Some(b_port), None);

    let origin_blocks = b.read_state(|s| s.chain.get_blocks().to_vec()).unwrap();
    assert_eq!(origin_blocks.len(), 2);
    assert!(eventually(|| {
        a.read_state(|s| s.chain.get_blocks() == origin_blocks.as_slice())
            .unwrap()
    }));
    assert_eq!(a.read_state(|s| s.chain.balance("miner")).unwrap(), 50);
}

#[test]
fn test_connect_floods_into_full_mesh() {
    let (c, c_port) = start_node("mesh-c", None, None);
    let (a, _) = start_node("mesh-a", Some(c_port), None);
    assert!(eventually(|| knows(&c, "mesh-a") && knows(&a, "mesh-c")));

    let (b, _) = start_node("mesh-b", Some(c_port), None);

    assert!(eventually(|| knows(&a, "mesh-b")));
    assert!(eventually(|| knows(&b, "mesh-a") && knows(&b, "mesh-c")));
    for node in [&a, &b, &c] {
        assert_eq!(node.read_state(|s| s.peers.len()).unwrap(), 2);
    }
}

#[test]
fn test_payment_needs_neighbor_approval() {
    let alice = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let (origin, origin_port) = start_node("pay-origin", None, Some(&alice.get_address()));
    origin.mine_tick().unwrap();

    let (jury, _) = start_node("pay-jury", Some(origin_port), None);
    assert!(eventually(|| knows(&origin, "pay-jury")));
    assert!(eventually(|| jury.read_state(|s| s.chain.height()).unwrap() == 2));

    let body = serde_json::json!({
        "sender": alice.get_address(),
        "receiver": bob.get_address(),
        "private_seed": alice.get_private_seed(),
        "amount": 20,
    })
    .to_string();
    let response = http(
        origin_port,
        &format!(
            "POST /transactions HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        ),
    );
    assert!(response.starts_with("HTTP/1.1 201"));
    let created = json_body(&response);
    assert_eq!(created["awaiting"][0], "pay-jury");
    let hash = created["hash"].as_str().unwrap().to_string();

    let is_pending = |node: &NodeService| {
        node.read_state(|s| {
            s.chain
                .get_pending_transactions()
                .iter()
                .any(|tx| tx.hash() == hash)
        })
        .unwrap()
    };
    assert!(eventually(|| is_pending(&jury)));
    assert!(eventually(|| is_pending(&origin)));

    // Once mined and announced, the jury drops it from its own pending list
    origin.mine_tick().unwrap();
    assert!(eventually(|| !is_pending(&jury)));
    assert_eq!(
        jury.read_state(|s| s.chain.balance(&bob.get_address())).unwrap(),
        20
    );
}

#[test]
fn test_unknown_http_route() {
    let (_, port) = start_node("http-node", None, None);
    let response = http(port, "GET /missing HTTP/1.1\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 404"));
    assert_eq!(json_body(&response)["message"], "Not found");
}
