mod common;

use common::{GEMINI_KEY, OPENAI_KEY, call, gateway, gemini_reply, get, openai_reply, post_json};
use crmgate::StatusCode;
use mockito::{Matcher, Server};
use serde_json::json;

#[tokio::test]
async fn analyze_decodes_a_fenced_gemini_reply() {
    let mut gemini = Server::new_async().await;
    let reply = "```json\n{\"score\": 88, \"insights\": [\"Opened every campaign email\"], \
                 \"recommendations\": [\"Book a product demo\"], \"categories\": [\"SaaS\"], \"tags\": [\"engaged\"]}\n```";
    let mock = gemini
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .match_query(Matcher::UrlEncoded("key".into(), GEMINI_KEY.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply(reply))
        .create_async()
        .await;

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY), ("GEMINI_BASE_URL", &gemini.url())]);
    let (status, body) = call(
        &app,
        post_json(
            "/ai-analyze",
            json!({
                "contactId": "c-1",
                "contact": {"name": "Ada Lovelace", "industry": "SaaS"},
                "analysisTypes": ["scoring", "categorization"]
            }),
        ),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["contactId"], "c-1");
    assert_eq!(body["score"], 88.0);
    assert_eq!(body["confidence"], 70.0);
    assert_eq!(body["provider"], "gemini");
    assert_eq!(body["model"], "gemini-1.5-flash");
    assert_eq!(body["tags"], json!(["engaged"]));
}

#[tokio::test]
async fn analyze_falls_back_after_two_undecodable_replies() {
    let mut gemini = Server::new_async().await;
    let mock = gemini
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(gemini_reply("I'm sorry, I can't share an assessment of this person."))
        .expect(2)
        .create_async()
        .await;

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY), ("GEMINI_BASE_URL", &gemini.url())]);
    let (status, body) = call(
        &app,
        post_json(
            "/ai-analyze",
            json!({
                "contactId": "c-2",
                "contact": {"name": "Grace Hopper", "industry": "Defense"},
                "analysisTypes": ["scoring"]
            }),
        ),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["score"], 60.0);
    assert_eq!(body["confidence"], 40.0);
    assert_eq!(body["recommendations"][0], "Follow up to gather more information");
    assert_eq!(body["categories"], json!(["Defense"]));
}

#[tokio::test]
async fn analyze_rejects_bad_requests_with_400() {
    let app = gateway(&[]);
    let (status, body) = call(
        &app,
        post_json("/ai-analyze", json!({"contactId": "c-1", "contact": {}, "analysisTypes": ["scoring"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "No AI provider API keys configured");

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY)]);
    let (status, body) = call(&app, post_json("/ai-analyze", json!({"contactId": "c-1"}))).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "Invalid request: missing required parameters");

    let (status, body) = call(
        &app,
        post_json(
            "/ai-analyze",
            json!({
                "contactId": "c-1",
                "contact": {},
                "analysisTypes": ["scoring"],
                "options": {"provider": "openai"}
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "Selected provider openai is not available");

    let (status, _) = call(&app, post_json("/ai-analyze", json!("not an object"))).await;
    assert_eq!(status, StatusCode::BadRequest);
}

#[tokio::test]
async fn bulk_analysis_summarizes_batches() {
    let mut gemini = Server::new_async().await;
    let mock = gemini
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(gemini_reply(r#"{"score": 50, "insights": [], "recommendations": ["Send a case study"]}"#))
        .expect(12)
        .create_async()
        .await;

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY), ("GEMINI_BASE_URL", &gemini.url())]);
    let ids: Vec<String> = (1..=12).map(|i| format!("c-{i}")).collect();
    let (status, body) = call(
        &app,
        post_json(
            "/ai-bulk-analyze",
            json!({"contactIds": ids, "analysisTypes": ["scoring"]}),
        ),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["results"].as_array().unwrap().len(), 12);
    assert_eq!(body["summary"]["total"], 12);
    assert_eq!(body["summary"]["successful"], 12);
    assert_eq!(body["summary"]["failed"], 0);
    assert_eq!(body["summary"]["averageScore"], 50.0);
}

#[tokio::test]
async fn bulk_analysis_reports_provider_failures_per_contact() {
    let mut gemini = Server::new_async().await;
    gemini
        .mock("POST", "/models/gemini-1.5-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(r#"{"error": {"message": "backend exploded"}}"#)
        .create_async()
        .await;

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY), ("GEMINI_BASE_URL", &gemini.url())]);
    let (status, body) = call(
        &app,
        post_json(
            "/ai-bulk-analyze",
            json!({"contactIds": ["a", "b", "c"], "analysisTypes": ["tagging"]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["summary"]["successful"], 0);
    assert_eq!(body["summary"]["failed"], 3);
    assert_eq!(body["summary"]["averageScore"], 0.0);
    assert_eq!(body["failed"][0]["contactId"], "a");
    assert_eq!(body["failed"][0]["error"], "gemini API error (500): backend exploded");
}

#[tokio::test]
async fn bulk_analysis_caps_the_batch() {
    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY)]);
    let ids: Vec<String> = (0..51).map(|i| i.to_string()).collect();
    let (status, body) = call(
        &app,
        post_json("/ai-bulk-analyze", json!({"contactIds": ids, "analysisTypes": ["scoring"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "Bulk analysis is limited to 50 contacts at a time");
}

#[tokio::test]
async fn enrich_uses_openai_when_gemini_is_absent() {
    let mut openai = Server::new_async().await;
    let mock = openai
        .mock("POST", "/chat/completions")
        .match_header("authorization", format!("Bearer {OPENAI_KEY}").as_str())
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .with_status(200)
        .with_body(openai_reply(r#"{"name": "Ada Lovelace", "company": "Analytical Engines", "confidence": 90}"#))
        .create_async()
        .await;

    let app = gateway(&[("OPENAI_API_KEY", OPENAI_KEY), ("OPENAI_BASE_URL", &openai.url())]);
    let (status, body) = call(
        &app,
        post_json(
            "/ai-enrich",
            json!({"enrichmentRequest": {"linkedinUrl": "https://www.linkedin.com/in/ada"}}),
        ),
    )
    .await;

    mock.assert_async().await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["name"], "Ada Lovelace");
    assert_eq!(body["confidence"], 90.0);
}

#[tokio::test]
async fn enrich_requires_an_identifier() {
    let app = gateway(&[("OPENAI_API_KEY", OPENAI_KEY)]);
    let (status, body) = call(
        &app,
        post_json("/ai-enrich", json!({"enrichmentRequest": {"company": "Acme"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(
        body["error"],
        "At least one identifier (email, name, or LinkedIn URL) is required"
    );
}

#[tokio::test]
async fn provider_status_lists_both_vendors() {
    let mut gemini = Server::new_async().await;
    gemini
        .mock("GET", "/models")
        .match_query(Matcher::UrlEncoded("key".into(), GEMINI_KEY.into()))
        .with_status(200)
        .with_body(r#"{"models": []}"#)
        .create_async()
        .await;

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY), ("GEMINI_BASE_URL", &gemini.url())]);
    let (status, body) = call(&app, get("/ai-providers-status")).await;

    assert_eq!(status, StatusCode::Ok);
    assert_eq!(
        body,
        json!([
            {"name": "openai", "status": "not_configured"},
            {"name": "gemini", "status": "available", "remaining": 60}
        ])
    );
}

#[tokio::test]
async fn generate_surfaces_provider_errors_as_502() {
    let mut gemini = Server::new_async().await;
    gemini
        .mock("POST", "/models/gemini-2.5-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"error": {"message": "Resource has been exhausted"}}"#)
        .create_async()
        .await;

    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY), ("GEMINI_BASE_URL", &gemini.url())]);
    let (status, body) = call(&app, post_json("/ai/generate", json!({"prompt": "Summarize Q3"}))).await;

    assert_eq!(status, StatusCode::BadGateway);
    assert_eq!(body["error"], "gemini API error (429): Resource has been exhausted");
}

#[tokio::test]
async fn generate_logs_usage_for_real_customers() {
    let mut gemini = Server::new_async().await;
    gemini
        .mock("POST", "/models/gemini-2.5-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(gemini_reply("```\nRevenue grew 12% quarter over quarter.\n```"))
        .create_async()
        .await;

    let mut backend = Server::new_async().await;
    backend
        .mock("GET", "/rest/v1/ai_model_configs")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let usage = backend
        .mock("POST", "/rest/v1/ai_usage_logs")
        .match_body(Matcher::PartialJson(json!({
            "customer_id": "cust-42",
            "model_id": "gemini-2.5-flash",
            "feature_used": "text-generation",
            "tokens_used": 100,
            "success": true
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let app = gateway(&[
        ("GEMINI_API_KEY", GEMINI_KEY),
        ("GEMINI_BASE_URL", &gemini.url()),
        ("SUPABASE_URL", &backend.url()),
        ("SUPABASE_ANON_KEY", "anon"),
    ]);
    let (status, body) = call(
        &app,
        post_json("/ai/generate", json!({"prompt": "Summarize Q3", "customerId": "cust-42"})),
    )
    .await;

    usage.assert_async().await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["content"], "Revenue grew 12% quarter over quarter.");
    assert_eq!(body["model"], "gemini-2.5-flash");
    assert_eq!(body["usage"]["totalTokens"], 100);
    assert_eq!(body["finishReason"], "STOP");
}

#[tokio::test]
async fn insights_without_keys_explain_configuration() {
    let app = gateway(&[]);
    let (status, body) = call(&app, post_json("/ai/insights", json!({"data": {"deals": []}}))).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["healthScore"], 75.0);
}

#[tokio::test]
async fn email_requires_recipient_and_purpose() {
    let app = gateway(&[("GEMINI_API_KEY", GEMINI_KEY)]);
    let (status, body) = call(&app, post_json("/ai/email", json!({"recipient": "Sam"}))).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "recipient and purpose are required");
}

#[tokio::test]
async fn recommendation_routes() {
    let app = gateway(&[]);

    let (status, body) = call(&app, get("/ai/recommendations/categorization")).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["modelId"], "gemma-2-2b-it");

    let (status, body) = call(&app, get("/ai/recommendations")).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body.as_object().unwrap().len(), 11);
    assert_eq!(body["contact_scoring"]["modelId"], "gemma-2-2b-it");

    let (status, body) = call(&app, get("/ai/recommendations/astrology")).await;
    assert_eq!(status, StatusCode::BadRequest);
    assert_eq!(body["error"], "Unknown task type: astrology");

    let (status, body) = call(&app, get("/ai/recommendations/categorization?provider=openai")).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["modelId"], "gemini-2.5-flash");
    assert_eq!(body["confidence"], 0.6);

    let (status, body) = call(&app, get("/ai/suitability?model=gemma-2-2b-it&task=categorization")).await;
    assert_eq!(status, StatusCode::Ok);
    assert_eq!(body["suitable"], true);

    let (status, _) = call(&app, get("/ai/suitability?model=gemma-2-2b-it")).await;
    assert_eq!(status, StatusCode::BadRequest);
}

#[tokio::test]
async fn model_listing_filters_by_provider() {
    let app = gateway(&[]);

    let (status, body) = call(&app, get("/models?provider=openai")).await;
    assert_eq!(status, StatusCode::Ok);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["gpt-4o", "gpt-4o-mini"]);

    let (status, _) = call(&app, get("/models?provider=azure")).await;
    assert_eq!(status, StatusCode::BadRequest);
}
