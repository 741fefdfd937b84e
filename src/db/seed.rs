use crate::db::{self, NewSurvey, NewUsuario};
use crate::domain::models::{Question, UserRole};
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use sqlx::PgPool;

pub async fn seed_all(pool: &PgPool) -> Result<()> {
    seed_empresas(pool).await?;
    seed_admin(pool).await?;
    seed_demo_survey(pool).await?;
    Ok(())
}

async fn seed_empresas(pool: &PgPool) -> Result<()> {
    let nombres = ["Grupo Andino", "DataCultura SA", "Innova Retail"];
    for nombre in nombres {
        sqlx::query("INSERT INTO empresas (nombre) VALUES ($1) ON CONFLICT (nombre) DO NOTHING")
            .bind(nombre)
            .execute(pool)
            .await?;
    }
    Ok(())
}

async fn seed_admin(pool: &PgPool) -> Result<()> {
    let email =
        std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@encuestas.local".to_string());
    if db::find_usuario_by_email(pool, &email).await?.is_some() {
        return Ok(());
    }

    let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "cambiame-ya".to_string());
    let salt = SaltString::generate(rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash admin password: {e}"))?
        .to_string();

    let empresas = db::list_empresas(pool).await?;
    let empresa = empresas
        .first()
        .ok_or_else(|| anyhow::anyhow!("no empresas to attach the admin to"))?;

    let admin = db::insert_usuario(
        pool,
        NewUsuario {
            email: email.clone(),
            hash,
            nombre: "Administrador".to_string(),
            empresa_id: empresa.id,
            rol: UserRole::Admin,
        },
    )
    .await?;
    db::confirm_usuario(pool, admin.id).await?;
    tracing::info!("Seeded admin account {email}");
    Ok(())
}

async fn seed_demo_survey(pool: &PgPool) -> Result<()> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM surveys")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(());
    }

    let prompts = [
        "¿Tu empresa usa reportes básicos (Excel, tablas manuales)?",
        "¿Se aplican análisis de datos más avanzados?",
        "¿Tienen dashboards automáticos (ej. Power BI, Tableau)?",
        "¿La dirección toma decisiones basadas en datos?",
        "¿Usan analítica predictiva o inteligencia artificial?",
    ];
    let options = [
        "1 - Nunca",
        "2 - A veces",
        "3 - Frecuentemente",
        "4 - Siempre",
    ];

    let questions: Vec<Question> = prompts
        .iter()
        .enumerate()
        .map(|(idx, prompt)| Question {
            id: idx as u32,
            text: prompt.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            multiple: false,
        })
        .collect();

    let empresas = db::list_empresas(pool).await?;
    let empresa = empresas
        .first()
        .ok_or_else(|| anyhow::anyhow!("no empresas to attach the demo survey to"))?;

    db::insert_survey(
        pool,
        NewSurvey {
            title: "Cultura de Datos".to_string(),
            description: "Evalúa el grado de madurez analítica de tu empresa.".to_string(),
            empresa_id: empresa.id,
            questions,
        },
    )
    .await?;
    tracing::info!("Seeded demo survey");
    Ok(())
}
