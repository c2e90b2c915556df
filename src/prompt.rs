//! Built-in prompt and model roster used when no configuration overrides them.

pub const DEFAULT_MODELS: &[&str] = &[
    "anthropic/claude-3.5-sonnet",
    "openai/gpt-4-turbo",
    "google/gemini-pro-1.5",
];

pub const DEFAULT_TITLE: &str = "AI 모델 컨설팅 결과";

pub const DEFAULT_PROMPT: &str = r#"
C++과 LuaJIT을 연동하여 다음 기능을 구현하려고 합니다:

1. UDP 소켓을 사용하여 데이터를 전송하는 기능
2. 콘솔에 로그를 출력하는 기능 (INFO, WARNING, ERROR 레벨)

이 두 기능을 C++로 구현하고, LuaJIT의 FFI를 사용하여 Lua 스크립트에서 호출할 수 있도록 만들려고 합니다.
Visual Studio 환경에서 DLL로 빌드할 예정입니다.

다음 사항에 대해 구체적인 조언을 부탁드립니다:

1. C++ 함수의 시그니처 설계 (extern "C" 사용, 메모리 관리 등)
2. UDP 소켓 구현 시 주의사항 (Windows 환경)
3. LuaJIT FFI 바인딩 시 고려사항
4. 에러 처리 전략
5. 스레드 안전성 고려사항

간결하고 실용적인 조언을 부탁드립니다.
"#;

pub fn default_models() -> Vec<String> {
    DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect()
}
