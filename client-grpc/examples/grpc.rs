//! gRPC client implementation

use greeter_client_grpc::prelude::*;

/// Example greeter-client-grpc
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::var("SERVER").unwrap_or_else(|_| "localhost:50051".to_owned());
    println!(
        "NOTE: Ensure the server is running on {} or this example will fail.",
        address
    );

    let mut client = GreeterClient::connect(format!("http://{}", address)).await?;
    println!("Connection created");

    let response = client
        .say_hello(tonic::Request::new(HelloRequest {
            name: "world".to_owned(),
        }))
        .await?;

    println!("RESPONSE={:?}", response.into_inner());

    Ok(())
}
