//! End-to-end delivery flows against a mock server

use digipost_client::api::ApiService;
use digipost_client::client::{DigipostClient, NoopEventLogger};
use digipost_client::config::{ClientConfig, DeliveryFlavour};
use digipost_client::encrypt::CmsEncrypter;
use digipost_client::error::Error;
use digipost_client::representations::{
    Document, FileType, Message, MessageRecipient, PostType, PrintDetails, PrintRecipient,
};
use digipost_client::security::{RsaKeySigner, Signer};
use digipost_client::sender::MessageSender;
use mockito::{Matcher, ServerGuard};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::sync::{Arc, OnceLock};

fn sender_private_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, 2048).unwrap()
    })
    .clone()
}

fn signer() -> Arc<dyn Signer> {
    Arc::new(RsaKeySigner::new(sender_private_key()))
}

fn soft_config(server: &ServerGuard) -> ClientConfig {
    let mut config = ClientConfig::new(server.url(), 497013).unwrap();
    config.fail_on_response_validation_error = false;
    config
}

fn message_sender(config: &ClientConfig) -> MessageSender {
    let api = Arc::new(ApiService::new(config, signer()).unwrap());
    MessageSender::new(api, config, Arc::new(CmsEncrypter), Arc::new(NoopEventLogger))
}

fn entry_point_body(base: &str) -> String {
    serde_json::json!({
        "link": [
            {"rel": "create-message", "uri": format!("{base}/messages")},
            {"rel": "get-encryption-key-for-print", "uri": format!("{base}/print-key")},
            {"rel": "identify-and-get-encryption-key", "uri": format!("{base}/identify-with-key")},
            {"rel": "identify", "uri": format!("{base}/identify")},
            {"rel": "search", "uri": format!("{base}/search")},
            {"rel": "autocomplete", "uri": format!("{base}/autocomplete")},
            {"rel": "inbox", "uri": format!("{base}/inbox")},
            {"rel": "document-events", "uri": format!("{base}/events")},
            {"rel": "sender-information", "uri": format!("{base}/sender-info")}
        ]
    })
    .to_string()
}

async fn mock_entry_point(server: &mut ServerGuard) -> mockito::Mock {
    let body = entry_point_body(&server.url());
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "application/vnd.digipost-v8+json")
        .with_body(body)
        .create_async()
        .await
}

fn minimal_pdf() -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n".to_vec();
    pdf.extend_from_slice(b"1 0 obj << /Type /Page >> endobj\n%%EOF\n");
    pdf
}

fn encryption_key_pem() -> String {
    RsaPublicKey::from(&sender_private_key())
        .to_public_key_pem(LineEnding::LF)
        .unwrap()
}

fn print_details() -> PrintDetails {
    let address = PrintRecipient {
        name: "Ola Nordmann".to_string(),
        address_line1: "Storgata 1".to_string(),
        address_line2: None,
        zip_code: "0155".to_string(),
        city: "Oslo".to_string(),
        country: None,
    };
    PrintDetails::new(address.clone(), address, PostType::B)
}

fn delivery_body(message: &Message, method: &str, status: &str, base: &str, with_send_link: bool) -> String {
    let uuid = message.primary_document.uuid;
    let mut value = serde_json::json!({
        "message-id": message.message_id,
        "delivery-method": method,
        "status": status,
        "primary-document": {
            "uuid": uuid,
            "subject": message.primary_document.subject,
            "file-type": message.primary_document.file_type.as_str(),
            "link": [
                {"rel": "add-content", "uri": format!("{base}/documents/{uuid}/content")},
                {"rel": "get-encryption-key", "uri": format!("{base}/documents/{uuid}/key")}
            ]
        },
    });
    if with_send_link {
        value["link"] = serde_json::json!([
            {"rel": "send", "uri": format!("{base}/messages/{}/send", message.message_id)}
        ]);
    }
    value.to_string()
}

#[tokio::test]
async fn stepwise_delivery_walks_create_upload_send() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Subject");
    let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), document.clone());
    let uuid = document.uuid;

    let create = server
        .mock("POST", "/messages")
        .with_status(201)
        .with_body(delivery_body(&message, "DIGIPOST", "NOT_COMPLETE", &base, false))
        .create_async()
        .await;
    let upload = server
        .mock("POST", format!("/documents/{}/content", uuid).as_str())
        .with_status(200)
        .with_body(delivery_body(&message, "DIGIPOST", "COMPLETE", &base, true))
        .create_async()
        .await;
    let send = server
        .mock("POST", "/messages/m1/send")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "message-id": "m1",
                "delivery-method": "DIGIPOST",
                "status": "DELIVERED",
                "delivered-date": "2026-08-06T10:00:00Z",
            })
            .to_string(),
        )
        .create_async()
        .await;

    let client = DigipostClient::new(soft_config(&server), signer()).unwrap();
    let mut delivery = client.create_message(message).await.unwrap();
    delivery.add_content(&document, minimal_pdf(), None).await.unwrap();
    let delivered = delivery.send().await.unwrap();

    assert!(delivered.is_already_delivered_to_digipost());
    create.assert_async().await;
    upload.assert_async().await;
    send.assert_async().await;
}

#[tokio::test]
async fn duplicate_still_sendable_returns_the_existing_delivery() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Subject");
    let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), document);
    let sender = message_sender(&soft_config(&server));

    let first_create = server
        .mock("POST", "/messages")
        .with_status(201)
        .with_body(delivery_body(&message, "DIGIPOST", "NOT_COMPLETE", &base, false))
        .create_async()
        .await;
    let first = sender.create_or_fetch_message(&message).await.unwrap();
    first_create.assert_async().await;

    // Mocks are matched newest-first: the 409 now shadows the 201
    let conflict = server
        .mock("POST", "/messages")
        .with_status(409)
        .with_header("Location", &format!("{base}/messages/m1"))
        .create_async()
        .await;
    let fetch_existing = server
        .mock("GET", "/messages/m1")
        .with_status(200)
        .with_body(delivery_body(&message, "DIGIPOST", "NOT_COMPLETE", &base, false))
        .create_async()
        .await;

    let second = sender.create_or_fetch_message(&message).await.unwrap();
    assert_eq!(second.message_id, first.message_id);
    assert_eq!(second.status, first.status);
    conflict.assert_async().await;
    fetch_existing.assert_async().await;
}

#[tokio::test]
async fn duplicate_already_delivered_fails() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Subject");
    let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), document.clone());
    let sender = message_sender(&soft_config(&server));

    let _conflict = server
        .mock("POST", "/messages")
        .with_status(409)
        .with_header("Location", &format!("{base}/messages/m1"))
        .create_async()
        .await;
    let uuid = document.uuid;
    let _fetch = server
        .mock("GET", "/messages/m1")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "message-id": "m1",
                "delivery-method": "DIGIPOST",
                "status": "DELIVERED",
                "delivered-date": "2026-08-01T10:00:00Z",
                "primary-document": {"uuid": uuid, "subject": "Subject", "file-type": "pdf"},
            })
            .to_string(),
        )
        .create_async()
        .await;

    let result = sender.create_or_fetch_message(&message).await;
    assert!(matches!(result, Err(Error::AlreadyDeliveredDigital(_))));
}

#[tokio::test]
async fn duplicate_with_different_content_fails() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let message = Message::new(
        "m1",
        MessageRecipient::digipost_address("ola#1234"),
        Document::new("Subject"),
    );
    let other = Message::new(
        "m1",
        MessageRecipient::digipost_address("ola#1234"),
        Document::new("Entirely different"),
    );
    let sender = message_sender(&soft_config(&server));

    let _conflict = server
        .mock("POST", "/messages")
        .with_status(409)
        .with_header("Location", &format!("{base}/messages/m1"))
        .create_async()
        .await;
    let _fetch = server
        .mock("GET", "/messages/m1")
        .with_status(200)
        .with_body(delivery_body(&other, "DIGIPOST", "NOT_COMPLETE", &base, false))
        .create_async()
        .await;

    let result = sender.create_or_fetch_message(&message).await;
    assert!(matches!(result, Err(Error::DuplicateDiffers(_))));
}

#[tokio::test]
async fn print_fallback_uploads_the_print_copy() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Subject").file_type(FileType::html());
    let message = Message::new(
        "m1",
        MessageRecipient::digipost_address("ola#1234").with_print_fallback(print_details()),
        document.clone(),
    );
    let sender = message_sender(&soft_config(&server));

    // The server resolves the delivery to the PRINT channel
    let _create = server
        .mock("POST", "/messages")
        .with_status(201)
        .with_body(delivery_body(&message, "PRINT", "NOT_COMPLETE", &base, false))
        .create_async()
        .await;
    let delivery = sender.create_or_fetch_message(&message).await.unwrap();

    let print_pdf = minimal_pdf();
    let upload = server
        .mock("POST", format!("/documents/{}/content", document.uuid).as_str())
        .match_body(Matcher::Exact(String::from_utf8(print_pdf.clone()).unwrap()))
        .with_status(200)
        .with_body(delivery_body(&message, "PRINT", "COMPLETE", &base, true))
        .create_async()
        .await;

    let digital_html = b"<html>digital original</html>".to_vec();
    let updated = sender
        .add_content(&delivery, &document, digital_html, Some(print_pdf))
        .await
        .unwrap();

    // The uploaded bytes were the print copy, not the digital original
    upload.assert_async().await;
    assert!(updated.send_link().is_some());
}

#[tokio::test]
async fn print_fallback_rejects_a_non_pdf_print_copy() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Subject").file_type(FileType::html());
    let message = Message::new(
        "m1",
        MessageRecipient::digipost_address("ola#1234").with_print_fallback(print_details()),
        document.clone(),
    );
    let sender = message_sender(&soft_config(&server));

    let _create = server
        .mock("POST", "/messages")
        .with_status(201)
        .with_body(delivery_body(&message, "PRINT", "NOT_COMPLETE", &base, false))
        .create_async()
        .await;
    let delivery = sender.create_or_fetch_message(&message).await.unwrap();

    let upload = server
        .mock("POST", Matcher::Regex("^/documents/.*".to_string()))
        .expect(0)
        .create_async()
        .await;
    let result = sender
        .add_content(&delivery, &document, b"x".to_vec(), Some(b"<html>not pdf</html>".to_vec()))
        .await;
    assert!(matches!(result, Err(Error::CannotConvert(_))));
    upload.assert_async().await;
}

#[tokio::test]
async fn print_key_is_cached_within_the_ttl() {
    let mut server = mockito::Server::new_async().await;
    let _entry = mock_entry_point(&mut server).await;

    let print_key = server
        .mock("GET", "/print-key")
        .with_status(200)
        .with_body(serde_json::json!({"key-id": "print-1", "value": encryption_key_pem()}).to_string())
        .expect(2)
        .create_async()
        .await;

    let mut config = soft_config(&server);
    config.print_key_cache_ttl_secs = 1;
    let sender = message_sender(&config);

    // Two reads inside the TTL share one fetch
    let first = sender.encryption_key_for_print().await.unwrap();
    let second = sender.encryption_key_for_print().await.unwrap();
    assert_eq!(first.key_id, second.key_id);

    // Past the TTL the next read refetches
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    sender.encryption_key_for_print().await.unwrap();

    print_key.assert_async().await;
}

#[tokio::test]
async fn disabled_print_key_cache_always_refetches() {
    let mut server = mockito::Server::new_async().await;
    let _entry = mock_entry_point(&mut server).await;

    let print_key = server
        .mock("GET", "/print-key")
        .with_status(200)
        .with_body(serde_json::json!({"key-id": "print-1", "value": encryption_key_pem()}).to_string())
        .expect(3)
        .create_async()
        .await;

    let mut config = soft_config(&server);
    config.disable_print_key_cache = true;
    let sender = message_sender(&config);

    for _ in 0..3 {
        sender.encryption_key_for_print().await.unwrap();
    }
    print_key.assert_async().await;
}

#[tokio::test]
async fn atomic_multipart_fetches_the_recipient_key_once() {
    let mut server = mockito::Server::new_async().await;
    let _entry = mock_entry_point(&mut server).await;

    let primary = Document::new("Letter");
    let attachment = Document::new("Attachment").pre_encrypt();
    let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), primary.clone())
        .attachments(vec![attachment.clone()]);

    let identify = server
        .mock("POST", "/identify-with-key")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "result": {"result": "DIGIPOST", "digipost-address": "ola#1234"},
                "encryption-key": {"key-id": "user-1", "value": encryption_key_pem()},
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let multipart_post = server
        .mock("POST", "/messages")
        .match_header("content-type", Matcher::Regex("multipart/mixed; boundary=.*".to_string()))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "message-id": "m1",
                "delivery-method": "DIGIPOST",
                "status": "COMPLETE",
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let sender = message_sender(&soft_config(&server));
    let contents = vec![(primary.uuid, minimal_pdf()), (attachment.uuid, minimal_pdf())];
    let delivery = sender.send_multipart_message(&message, &contents).await.unwrap();

    assert_eq!(delivery.message_id, "m1");
    identify.assert_async().await;
    multipart_post.assert_async().await;
}

#[tokio::test]
async fn atomic_multipart_without_reachable_key_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Letter").pre_encrypt();
    // No print fallback, and the recipient turns out not to be digital
    let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), document.clone());

    let _identify = server
        .mock("POST", "/identify-with-key")
        .with_status(200)
        .with_body(serde_json::json!({"result": {"result": "UNIDENTIFIED"}}).to_string())
        .create_async()
        .await;
    let multipart_post = server.mock("POST", "/messages").expect(0).create_async().await;

    let sender = message_sender(&soft_config(&server));
    let result = sender
        .send_multipart_message(&message, &[(document.uuid, minimal_pdf())])
        .await;

    assert!(matches!(result, Err(Error::UnknownRecipient(_))));
    multipart_post.assert_async().await;
}

#[tokio::test]
async fn entry_point_is_fetched_once_per_instance() {
    let mut server = mockito::Server::new_async().await;
    let body = entry_point_body(&server.url());
    let entry = server
        .mock("GET", "/")
        .with_status(200)
        .with_body(body)
        .expect(1)
        .create_async()
        .await;
    let _search_a = server
        .mock("GET", "/search/nordmann")
        .with_status(200)
        .with_body(r#"{"recipient": []}"#)
        .create_async()
        .await;
    let _search_b = server
        .mock("GET", "/search/hansen")
        .with_status(200)
        .with_body(r#"{"recipient": []}"#)
        .create_async()
        .await;

    let client = DigipostClient::new(soft_config(&server), signer()).unwrap();
    client.search("nordmann").await.unwrap();
    client.search("hansen").await.unwrap();
    entry.assert_async().await;
}

fn fresh_http_date() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[tokio::test]
async fn hard_mode_rejects_a_response_digest_mismatch() {
    let mut server = mockito::Server::new_async().await;
    let entry_body = entry_point_body(&server.url());
    let _entry = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("Date", &fresh_http_date())
        .with_body(entry_body)
        .create_async()
        .await;
    let _search = server
        .mock("GET", "/search/nordmann")
        .with_status(200)
        .with_header("Date", &fresh_http_date())
        .with_header("X-Content-SHA256", "bm90LXRoZS1yZWFsLWRpZ2VzdA==")
        .with_body(r#"{"recipient": []}"#)
        .create_async()
        .await;

    let mut config = soft_config(&server);
    config.fail_on_response_validation_error = true;
    let client = DigipostClient::new(config, signer()).unwrap();

    let result = client.search("nordmann").await;
    assert!(matches!(result, Err(Error::DigestMismatch(_))));
}

#[tokio::test]
async fn soft_mode_swallows_verification_failures() {
    let mut server = mockito::Server::new_async().await;
    let _entry = mock_entry_point(&mut server).await;
    let _search = server
        .mock("GET", "/search/nordmann")
        .with_status(200)
        .with_header("X-Content-SHA256", "bm90LXRoZS1yZWFsLWRpZ2VzdA==")
        .with_body(r#"{"recipient": []}"#)
        .create_async()
        .await;

    let client = DigipostClient::new(soft_config(&server), signer()).unwrap();
    assert!(client.search("nordmann").await.is_ok());
}

#[tokio::test]
async fn atomic_flavour_sends_a_single_multipart_request() {
    let mut server = mockito::Server::new_async().await;
    let _entry = mock_entry_point(&mut server).await;

    let document = Document::new("Subject");
    let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), document.clone());

    let multipart_post = server
        .mock("POST", "/messages")
        .match_header("content-type", Matcher::Regex("multipart/mixed.*".to_string()))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "message-id": "m1",
                "delivery-method": "DIGIPOST",
                "status": "COMPLETE",
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let mut config = soft_config(&server);
    config.delivery_flavour = DeliveryFlavour::Atomic;
    let client = DigipostClient::new(config, signer()).unwrap();

    let mut delivery = client.create_message(message).await.unwrap();
    delivery.add_content(&document, minimal_pdf(), None).await.unwrap();
    delivery.send().await.unwrap();
    multipart_post.assert_async().await;
}

#[tokio::test]
async fn inbox_listing_and_delete_follow_links() {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    let _entry = mock_entry_point(&mut server).await;

    let _inbox = server
        .mock("GET", Matcher::Regex("^/inbox.*".to_string()))
        .with_status(200)
        .with_body(
            serde_json::json!({
                "document": [{
                    "id": 7,
                    "subject": "Invoice",
                    "sender": "Acme",
                    "delivery-time": "2026-06-01T08:00:00Z",
                    "link": [
                        {"rel": "letter-content", "uri": format!("{base}/letters/7/content")},
                        {"rel": "delete-letter", "uri": format!("{base}/letters/7")}
                    ]
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let content = server
        .mock("GET", "/letters/7/content")
        .with_status(200)
        .with_body("letter bytes")
        .create_async()
        .await;
    let delete = server.mock("DELETE", "/letters/7").with_status(204).create_async().await;

    let client = DigipostClient::new(soft_config(&server), signer()).unwrap();
    let inbox = client.get_inbox(0, 10).await.unwrap();
    assert_eq!(inbox.documents.len(), 1);

    let letter = &inbox.documents[0];
    let bytes = client.get_inbox_letter_content(letter).await.unwrap();
    assert_eq!(bytes, b"letter bytes");
    client.delete_inbox_letter(letter).await.unwrap();

    content.assert_async().await;
    delete.assert_async().await;
}
