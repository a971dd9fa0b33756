/*!
 * @file auth.rs
 * @brief Per-socket SCRAM-SHA-1 and MONGODB-CR authentication
 */

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::bson::{Binary, Bson, Document};
use crate::config::{AuthMechanism, Credentials};
use crate::doc;
use crate::error::{Error, Result};
use crate::pool::{ConnectionPool, PooledSocket};
use crate::wire;

type HmacSha1 = Hmac<Sha1>;

/// Run the configured mechanism on a freshly acquired socket. Called once
/// per slot; the pool remembers the slot as authenticated afterwards.
pub(crate) async fn authenticate_socket(
    socket: &mut PooledSocket,
    pool: &ConnectionPool,
    credentials: &Credentials,
    mechanism: AuthMechanism,
) -> Result<()> {
    match mechanism {
        AuthMechanism::ScramSha1 => scram_sha1(socket, pool, credentials).await,
        AuthMechanism::MongodbCr => mongodb_cr(socket, pool, credentials).await,
    }
}

/// RFC 5802 over the command channel: saslStart, saslContinue with the
/// client proof, server-signature check, then an empty exchange when the
/// server did not finish early.
async fn scram_sha1(
    socket: &mut PooledSocket,
    pool: &ConnectionPool,
    credentials: &Credentials,
) -> Result<()> {
    let client_nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    let user = credentials.user.replace('=', "=3D").replace(',', "=2C");
    let client_first_bare = format!("n={user},r={client_nonce}");
    let client_first = format!("n,,{client_first_bare}");

    let start = doc! {
        "saslStart": 1,
        "mechanism": "SCRAM-SHA-1",
        "payload": Binary::generic(client_first.into_bytes()),
        "autoAuthorize": 1,
        "options": { "skipEmptyExchange": true },
    };
    let first_reply = run_auth_command(socket, pool, &credentials.auth_db, start).await?;
    check_ok(&first_reply)?;
    let conversation_id = first_reply
        .get("conversationId")
        .cloned()
        .ok_or_else(|| Error::Auth("saslStart reply lacks conversationId".to_string()))?;

    let server_first = String::from_utf8(payload_of(&first_reply)?)
        .map_err(|_| Error::Protocol("SCRAM server-first message is not UTF-8".to_string()))?;
    let combined_nonce = scram_field(&server_first, 'r')?.to_string();
    if !combined_nonce.starts_with(&client_nonce) {
        return Err(Error::Protocol("server dropped the client nonce".to_string()));
    }
    let salt = BASE64
        .decode(scram_field(&server_first, 's')?)
        .map_err(|_| Error::Protocol("SCRAM salt is not base64".to_string()))?;
    let iterations: u32 = scram_field(&server_first, 'i')?
        .parse()
        .map_err(|_| Error::Protocol("SCRAM iteration count is not a number".to_string()))?;

    let digest = password_digest(&credentials.user, &credentials.pass);
    let mut salted_password = [0u8; 20];
    pbkdf2::pbkdf2_hmac::<Sha1>(digest.as_bytes(), &salt, iterations, &mut salted_password);

    let client_key = hmac_sha1(&salted_password, b"Client Key");
    let stored_key = sha1_digest(&client_key);
    let client_final_bare = format!("c=biws,r={combined_nonce}");
    let auth_message = format!("{client_first_bare},{server_first},{client_final_bare}");
    let client_signature = hmac_sha1(&stored_key, auth_message.as_bytes());
    let proof: Vec<u8> = client_key
        .iter()
        .zip(client_signature.iter())
        .map(|(k, s)| k ^ s)
        .collect();
    let client_final = format!("{client_final_bare},p={}", BASE64.encode(proof));

    let cont = doc! {
        "saslContinue": 1,
        "conversationId": conversation_id.clone(),
        "payload": Binary::generic(client_final.into_bytes()),
    };
    let second_reply = run_auth_command(socket, pool, &credentials.auth_db, cont).await?;
    check_ok(&second_reply)?;

    let server_final = String::from_utf8(payload_of(&second_reply)?)
        .map_err(|_| Error::Protocol("SCRAM server-final message is not UTF-8".to_string()))?;
    let server_key = hmac_sha1(&salted_password, b"Server Key");
    let expected_signature = BASE64.encode(hmac_sha1(&server_key, auth_message.as_bytes()));
    if scram_field(&server_final, 'v')? != expected_signature {
        return Err(Error::Protocol("SCRAM server signature mismatch".to_string()));
    }

    if !is_done(&second_reply) {
        let finish = doc! {
            "saslContinue": 1,
            "conversationId": conversation_id,
            "payload": Binary::generic(Vec::new()),
        };
        let third_reply = run_auth_command(socket, pool, &credentials.auth_db, finish).await?;
        check_ok(&third_reply)?;
        if !is_done(&third_reply) {
            return Err(Error::Auth(
                "server did not complete the SCRAM conversation".to_string(),
            ));
        }
    }
    debug!(user = %credentials.user, db = %credentials.auth_db, "SCRAM-SHA-1 conversation complete");
    Ok(())
}

/// Pre-3.0 challenge/response: getnonce, then authenticate with
/// `md5(nonce + user + passwordDigest)`.
async fn mongodb_cr(
    socket: &mut PooledSocket,
    pool: &ConnectionPool,
    credentials: &Credentials,
) -> Result<()> {
    let reply =
        run_auth_command(socket, pool, &credentials.auth_db, doc! { "getnonce": 1 }).await?;
    check_ok(&reply)?;
    let nonce = reply.get_str("nonce")?.to_string();

    let digest = password_digest(&credentials.user, &credentials.pass);
    let key = format!(
        "{:x}",
        md5::compute(format!("{nonce}{}{digest}", credentials.user))
    );
    let authenticate = doc! {
        "authenticate": 1,
        "user": credentials.user.clone(),
        "nonce": nonce,
        "key": key,
    };
    let reply = run_auth_command(socket, pool, &credentials.auth_db, authenticate).await?;
    check_ok(&reply)?;
    debug!(user = %credentials.user, db = %credentials.auth_db, "MONGODB-CR exchange complete");
    Ok(())
}

async fn run_auth_command(
    socket: &mut PooledSocket,
    pool: &ConnectionPool,
    db: &str,
    command: Document,
) -> Result<Document> {
    let request_id = pool.next_request_id();
    let namespace = format!("{db}.$cmd");
    let packet = wire::encode_query(request_id, 0, &namespace, 0, -1, &command, None)?;
    let reply = socket.round_trip(packet).await?;
    reply
        .documents
        .into_iter()
        .next()
        .ok_or_else(|| Error::Auth("empty reply to authentication command".to_string()))
}

/// The digest MongoDB salts: `hex(md5("<user>:mongo:<pass>"))`.
fn password_digest(user: &str, pass: &str) -> String {
    format!("{:x}", md5::compute(format!("{user}:mongo:{pass}")))
}

fn check_ok(reply: &Document) -> Result<()> {
    if reply.contains_key("code") {
        return Err(Error::Auth(failure_message(reply)));
    }
    let ok = reply.get("ok").and_then(Bson::numeric).unwrap_or(0.0);
    if ok == 0.0 {
        return Err(Error::Auth(failure_message(reply)));
    }
    Ok(())
}

fn failure_message(reply: &Document) -> String {
    match reply.get("errmsg") {
        Some(Bson::String(msg)) => msg.clone(),
        _ => format!("authentication command failed: {reply}"),
    }
}

fn is_done(reply: &Document) -> bool {
    matches!(reply.get("done"), Some(Bson::Boolean(true)))
}

fn payload_of(reply: &Document) -> Result<Vec<u8>> {
    match reply.get("payload") {
        Some(Bson::Binary(bin)) => Ok(bin.bytes.clone()),
        Some(Bson::String(text)) => BASE64
            .decode(text)
            .map_err(|_| Error::Protocol("string payload is not base64".to_string())),
        _ => Err(Error::Protocol("authentication reply lacks a payload".to_string())),
    }
}

fn scram_field<'a>(message: &'a str, name: char) -> Result<&'a str> {
    for part in message.split(',') {
        if let Some(rest) = part.strip_prefix(name) {
            if let Some(value) = rest.strip_prefix('=') {
                return Ok(value);
            }
        }
    }
    Err(Error::Protocol(format!("SCRAM message lacks the {name}= attribute")))
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC-SHA-1 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}
