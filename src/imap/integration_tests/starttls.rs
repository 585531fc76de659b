//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

use std::fs;
use std::pin::Pin;

use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::ssl::{Ssl, SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::{X509Builder, X509NameBuilder};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_openssl::SslStream;

use super::defs::*;
use crate::support::system_config::{SystemConfig, TlsConfig};

/// Write a throwaway self-signed certificate into `dir` and return the TLS
/// configuration pointing at it.
fn self_signed(dir: &TempDir) -> TlsConfig {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(2).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let tls = TlsConfig {
        private_key: dir.path().join("key.pem"),
        certificate_chain: dir.path().join("cert.pem"),
    };
    fs::write(&tls.private_key, key.private_key_to_pem_pkcs8().unwrap())
        .unwrap();
    fs::write(&tls.certificate_chain, cert.to_pem().unwrap()).unwrap();
    tls
}

fn set_up_tls() -> (TempDir, Setup) {
    let dir = TempDir::new().unwrap();
    let config = SystemConfig {
        tls: Some(self_signed(&dir)),
        ..SystemConfig::default()
    };
    (dir, set_up_with_config(config))
}

async fn tls_connect<S: AsyncRead + AsyncWrite + Unpin>(
    io: S,
) -> SslStream<S> {
    let mut connector = SslConnector::builder(SslMethod::tls()).unwrap();
    connector.set_verify(SslVerifyMode::NONE);
    let ssl = connector
        .build()
        .configure()
        .unwrap()
        .into_ssl("localhost")
        .unwrap();
    let mut stream = SslStream::new(ssl, io).unwrap();
    Pin::new(&mut stream).connect().await.unwrap();
    stream
}

#[tokio::test]
async fn starttls_upgrades_connection() {
    let (_dir, setup) = set_up_tls();
    let mut client = setup.connect("tlsupgr");

    let greeting = client.read_logical_line().await;
    assert!(greeting.contains(" STARTTLS"), "{}", greeting);

    let responses = command!(client, "LOGIN {} hunter2", USER);
    assert_tagged_ok_any(&responses);
    ok_command!(client, "LOGOUT");

    let mut client = setup.connect("tlsupgr");
    skip_greeting(&mut client).await;
    let responses = command!(client, "STARTTLS");
    assert_eq!("t1 OK Begin TLS negotiation now", responses[0]);

    let stream = tls_connect(client.into_inner()).await;
    let mut client = TestClient::new(stream);

    // No new greeting follows the handshake
    let responses = ok_command!(client, "CAPABILITY");
    let caps = has_line_like(&responses, r"^\* CAPABILITY ");
    assert!(!caps.contains("STARTTLS"), "{}", caps);

    let responses = command!(client, "STARTTLS");
    assert_tagged_bad(&responses);

    ok_command!(client, "LOGIN {} hunter2", USER);
    quick_select(&mut client, "INBOX").await;
    ok_command!(client, "LOGOUT");
}

#[tokio::test]
async fn starttls_without_tls_configured() {
    let setup = set_up();
    let mut client = setup.connect("tlsnone");

    let greeting = client.read_logical_line().await;
    assert!(!greeting.contains("STARTTLS"), "{}", greeting);

    let responses = command!(client, "STARTTLS");
    assert_tagged_no(&responses);
    ok_command!(client, "NOOP");
}

#[tokio::test]
async fn starttls_after_login_refused() {
    let (_dir, setup) = set_up_tls();
    let mut client = setup.connect("tlslate");
    quick_log_in(&mut client).await;

    let responses = command!(client, "STARTTLS");
    assert_tagged_no(&responses);
}

#[tokio::test]
async fn implicit_tls() {
    let (_dir, setup) = set_up_tls();
    let (client, server_io) = tokio::io::duplex(1 << 20);
    let server = setup.server.clone();
    tokio::spawn(async move {
        let _ = server.serve_tls(server_io, "implicit").await;
    });

    let stream = tls_connect(client).await;
    let mut client = TestClient::new(stream);
    let greeting = client.read_logical_line().await;
    assert!(greeting.starts_with("* OK "), "{}", greeting);
    assert!(!greeting.contains("STARTTLS"), "{}", greeting);

    ok_command!(client, "LOGIN {} hunter2", USER);
    ok_command!(client, "LOGOUT");
}
