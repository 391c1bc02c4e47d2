//! Two endpoints wired back to back over the in-process channel transport:
//! a server exposing an observable temperature resource, and a client that
//! reads it and then receives notifications.
//!
//! Run with: cargo run -p rcoap-endpoint-core --example loopback

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rcoap_endpoint_core::prelude::*;
use rcoap_endpoint_core::{CoapServer, Result};
use rcoap_transport::mock::ChannelTransport;
use rcoap_transport::TransportContext;

struct Temperature(Mutex<String>);

#[async_trait]
impl CoapHandler for Temperature {
    async fn handle(&self, exchange: &mut CoapExchange) -> Result<()> {
        let value = self.0.lock().unwrap().clone();
        exchange.respond(Code::Content, value);
        Ok(())
    }
}

struct PrintingObserver {
    token: Bytes,
}

#[async_trait]
impl ObservationHandler for PrintingObserver {
    fn has_observation(&self, token: &Bytes) -> bool {
        token == &self.token
    }

    async fn notification(&self, exchange: &mut CoapExchange) {
        println!(
            "notification: observe={:?} payload={}",
            exchange.request().headers().observe,
            exchange.request().payload_string()
        );
    }

    async fn observation_terminated(&self, error: CoapError, _context: TransportContext) {
        println!("{error}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let server_addr = "127.0.0.1:5683".parse().unwrap();
    let client_addr = "127.0.0.1:5684".parse().unwrap();
    let (server_transport, client_transport) = ChannelTransport::pair(server_addr, client_addr);

    // server side: observable /temp resource
    let server = CoapServer::builder(server_transport).build();
    let temperature = Arc::new(Temperature(Mutex::new("21C".to_string())));
    let resource = Arc::new(ObservableResource::new(temperature.clone()));
    server.add_request_handler("/temp", resource.clone());
    server.start().await?;

    // client side: plain endpoint with an observation sink
    let client = CoapServer::builder(client_transport).build();
    let token = Bytes::from_static(&[0x42]);
    client.set_observation_handler(Arc::new(PrintingObserver {
        token: token.clone(),
    }));
    client.start().await?;

    // plain GET
    let request = CoapPacket::request(server_addr, Method::Get, "/temp");
    let response = client.make_request(request).await?;
    println!("GET /temp -> {}", response.payload_string());

    // register an observation
    let mut observe = CoapPacket::request(server_addr, Method::Get, "/temp");
    observe.set_token(token)?;
    observe.headers_mut().observe = Some(0);
    let response = client.make_request(observe).await?;
    println!(
        "observe registered, seq {:?}, payload {}",
        response.headers().observe,
        response.payload_string()
    );

    // the resource changes twice
    for value in ["22C", "23C"] {
        *temperature.0.lock().unwrap() = value.to_string();
        resource
            .notify_change(&server, value, &NotifyOptions::default(), Arc::new(NullDeliveryListener))
            .await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    resource.notify_termination(&server, Some(Code::NotFound)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.stop().await?;
    server.stop().await?;
    Ok(())
}
