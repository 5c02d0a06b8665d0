#[macro_export]
/// Creates a mock web server which responds to HEAD probes with a
/// predefined status, optionally customized through `ResponseTemplate`
/// method calls
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::method("HEAD")).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}
